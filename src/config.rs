use std::env;

#[derive(Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub jwt_secret: String,
    pub osrm_url: String,
    pub prefs_path: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            supabase_url: env::var("SUPABASE_URL")
                .expect("SUPABASE_URL must be set"),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .expect("SUPABASE_ANON_KEY must be set"),
            jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .expect("SUPABASE_JWT_SECRET must be set"),
            osrm_url: env::var("OSRM_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".to_string()),
            prefs_path: env::var("PREFS_PATH")
                .unwrap_or_else(|_| "haemolink-prefs.json".to_string()),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Base URL of the PostgREST RPC endpoint, without a trailing slash.
    pub fn rpc_base(&self) -> String {
        format!("{}/rest/v1/rpc", self.supabase_url.trim_end_matches('/'))
    }
}
