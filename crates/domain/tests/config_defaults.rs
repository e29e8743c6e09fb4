use sc_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3001);
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3001
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn cors_config_parses_custom_origins() {
    let toml_str = r#"
[server.cors]
allowed_origins = ["https://chat.example.com", "http://localhost:3000"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.cors.allowed_origins.len(), 2);
    assert!(config
        .server
        .cors
        .allowed_origins
        .contains(&"https://chat.example.com".to_string()));
}

#[test]
fn api_token_env_default() {
    let config = Config::default();
    assert_eq!(config.server.api_token_env, "SC_API_TOKEN");
}

#[test]
fn chat_limits_default() {
    let config = Config::default();
    assert_eq!(config.chat.stream_timeout_secs, 300);
    assert_eq!(config.chat.title_max_chars, 50);
    assert_eq!(config.chat.max_message_chars, 10_000);
    assert_eq!(config.chat.idempotency_key_max_len, 64);
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
[server]
port = 4000

[llm]
base_url = "http://localhost:8080/v1"
default_model = "qwen/qwen3-coder:free"

[llm.auth]
env = "MY_KEY"

[storage]
data_dir = "/var/lib/simplechat"

[uploads]
dir = "/var/lib/simplechat/uploads"

[chat]
stream_timeout_secs = 60

[observability]
otlp_endpoint = "http://localhost:4317"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.llm.default_model, "qwen/qwen3-coder:free");
    assert_eq!(config.llm.auth.env.as_deref(), Some("MY_KEY"));
    assert_eq!(config.chat.stream_timeout_secs, 60);
    assert_eq!(config.chat.title_max_chars, 50);
    assert_eq!(
        config.observability.otlp_endpoint.as_deref(),
        Some("http://localhost:4317")
    );
    assert!(config.validate().is_empty());
}
