#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub host: String,
    pub port: u16,
    pub log_dir: String,
    pub classifier_url: String,
    pub agents_url: String,
    pub workflow_url: String,
    pub editor_url: String,
    pub classify_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub edit_timeout_secs: u64,
    pub worker_count: usize,
    pub validator_command: String,
}

impl Config {
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            log_dir: ".flowforge/logs".to_string(),
            classifier_url: "http://localhost:8005/chat".to_string(),
            agents_url: "http://localhost:8003/chat".to_string(),
            workflow_url: "http://localhost:8004/chat".to_string(),
            editor_url: "http://localhost:8002/chat".to_string(),
            classify_timeout_secs: 30,
            generate_timeout_secs: 150,
            edit_timeout_secs: 60,
            worker_count: 4,
            validator_command: "flowforge-validate".to_string(),
        }
    }
}
