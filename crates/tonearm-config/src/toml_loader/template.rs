//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Tonearm Configuration
# Only override what you want to change -- missing fields use defaults.

# REQUIRED: the bot's user id, sent to every node as the User-Id header.
# Tonearm refuses to start until this is filled in.
user_id = ""
# Number of gateway shards, sent as Num-Shards.
shard_count = 1

[[nodes]]
id = "local"
host = "localhost"
port = 2333
password = "youshallnotpass"
# region = "us-east"
# secure = false

[pool]
# failover_on_disconnect = true
# event_buffer = 256     # 16-65536

[logging]
# level = "info"         # trace, debug, info, warn, error
"##
    .to_string()
}
