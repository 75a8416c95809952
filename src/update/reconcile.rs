// Writing resolved updates back into the config
//
// Every write is a key-path set inside the resource's own subtree or inside the
// shared settings of the updater that produced the update.

use super::resolve::ResolvedUpdate;
use crate::config::Config;
use serde_yaml::Mapping;

pub fn apply_plugin_update(config: &mut Config, plugin: &str, update: &ResolvedUpdate) {
    config.set_in(&["plugins", plugin, "file"], update.file_name.as_str());
    if let Some(version) = &update.version {
        config.set_in(&["plugins", plugin, "version"], version.as_str());
    }
    if !update.authors.is_empty() {
        config.set_in(&["plugins", plugin, "authors"], update.authors.clone());
    }
    config.set_in(&["plugins", plugin, "hashes"], update.hashes.to_value());

    write_keys(
        config,
        &["plugins", plugin, update.updater_path],
        &update.delta.resource,
    );
    write_keys(
        config,
        &["updater_settings", "plugin", update.updater_path],
        &update.delta.common,
    );
}

/// Only the keys the updater reported are touched, so `server.build_number`
/// keeps its value when an updater does not track builds.
pub fn apply_server_update(config: &mut Config, update: &ResolvedUpdate) {
    config.set_in(&["server", "file"], update.file_name.as_str());
    config.set_in(&["server", "hashes"], update.hashes.to_value());
    write_keys(config, &["server"], &update.delta.resource);
    write_keys(
        config,
        &["updater_settings", "server", update.updater_path],
        &update.delta.common,
    );
}

fn write_keys(config: &mut Config, parent: &[&str], values: &Mapping) {
    for (key, value) in values {
        let Some(key) = key.as_str() else {
            continue;
        };
        let mut path = parent.to_vec();
        path.push(key);
        config.set_in(&path, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hashes;
    use crate::updaters::UpdaterConfig;

    fn config() -> Config {
        let data = serde_yaml::from_str(
            r#"
server:
  enable: true
  file: server.jar
  type: paper
  version: "1.20.4"
  build_number: 490
  custom_url:
  hashes: {md5: old}
updater_settings:
  plugin:
    github: {token: secret}
    jenkins: {}
  server:
    papermc: {}
plugins:
  Foo:
    exclude: false
    file: Foo [1.0].jar
    version: "1.0"
    github: {repo: foo/foo, commit: aaa}
  Bar:
    exclude: false
    file: Bar [3.0].jar
    version: "3.0"
    github: {repo: bar/bar, commit: ccc}
"#,
        )
        .unwrap();
        Config::from_value("config.yaml", data)
    }

    fn update(delta: UpdaterConfig) -> ResolvedUpdate {
        ResolvedUpdate {
            file_name: "Foo [1.1].jar".into(),
            staged: "Foo [1.1].jar".into(),
            version: Some("1.1".into()),
            authors: vec!["foo-dev".into()],
            hashes: Hashes {
                md5: Some("m".into()),
                sha1: Some("s1".into()),
                sha256: Some("s256".into()),
                sha512: Some("s512".into()),
            },
            updater_path: "github",
            delta,
        }
    }

    #[test]
    fn test_plugin_update_stays_in_its_namespaces() {
        let mut config = config();
        let before = config.data().clone();
        let mut delta = UpdaterConfig::default();
        delta.set_resource("commit", "bbb");
        delta.set_common("last_seen", "bbb");

        apply_plugin_update(&mut config, "Foo", &update(delta));

        let after = config.data();
        assert_eq!(after["plugins"]["Bar"], before["plugins"]["Bar"]);
        assert_eq!(after["server"], before["server"]);
        assert_eq!(
            after["updater_settings"]["plugin"]["jenkins"],
            before["updater_settings"]["plugin"]["jenkins"]
        );
        assert_eq!(after["updater_settings"]["server"], before["updater_settings"]["server"]);

        assert_eq!(config.get_str("plugins.Foo.file").as_deref(), Some("Foo [1.1].jar"));
        assert_eq!(config.get_str("plugins.Foo.version").as_deref(), Some("1.1"));
        assert_eq!(config.get_str("plugins.Foo.hashes.sha512").as_deref(), Some("s512"));
        assert_eq!(config.get_str("plugins.Foo.github.commit").as_deref(), Some("bbb"));
        assert_eq!(config.get_str("plugins.Foo.github.repo").as_deref(), Some("foo/foo"));
        assert_eq!(
            config.get_str("updater_settings.plugin.github.token").as_deref(),
            Some("secret")
        );
        assert_eq!(
            config.get_str("updater_settings.plugin.github.last_seen").as_deref(),
            Some("bbb")
        );
    }

    #[test]
    fn test_server_update_only_overwrites_reported_keys() {
        let mut config = config();
        let mut server_update = update(UpdaterConfig::default());
        server_update.file_name = "server.jar".into();
        server_update.updater_path = "papermc";

        apply_server_update(&mut config, &server_update);
        assert_eq!(config.get_i64("server.build_number"), Some(490));
        assert_eq!(config.get_str("server.hashes.md5").as_deref(), Some("m"));

        server_update.delta.set_resource("build_number", 496);
        apply_server_update(&mut config, &server_update);
        assert_eq!(config.get_i64("server.build_number"), Some(496));
        assert_eq!(config.get_str("server.version").as_deref(), Some("1.20.4"));
    }
}
