// Default documents written for a fresh install

/// Fixed part of the config. Updater settings are merged in at registration.
pub const DEFAULT_CONFIG: &str = r#"
last_update:
settings:
  # Local path of the server. Remote locations use a scheme like sftp://
  server_folder:
  # Hours between two unforced update runs
  update_cooldown: 12
  # Keep config entries of plugins whose jar was deleted
  keep_removed: true
  # Plugin updaters tried in this order, first hit wins
  update_order: []
updater_settings:
  server: {}
  plugin: {}
server:
  enable: false
  file: server.jar
  type: paper
  version: "1.20.4"
  build_number:
  custom_url:
  hashes:
    md5:
    sha1:
    sha256:
    sha512:
plugins: {}
"#;

/// Template for a plugin entry. Each plugin updater adds its own sub-mapping.
pub const DEFAULT_PLUGIN: &str = r#"
exclude: false
file:
version:
authors: []
hashes:
  md5:
  sha1:
  sha256:
  sha512:
"#;
