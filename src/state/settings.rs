use survivor_league::client::{DEFAULT_SEASON_ID, SNAPSHOT_ENV};

#[derive(Debug, Default, Clone)]
pub struct AppSettings {
    /// Base URL of the league document API. Without it the app runs from a
    /// local snapshot and admin commands are unavailable.
    pub api_url: Option<String>,
    pub season_id: String,
    /// Local league snapshot overriding the remote store.
    pub snapshot_path: Option<String>,
    /// The signed-in league member, used by the pick commands.
    pub user_id: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppSettings {
    pub fn load() -> Self {
        Self {
            api_url: env_var("TORCHTALLY_API_URL"),
            season_id: env_var("TORCHTALLY_SEASON_ID")
                .unwrap_or_else(|| DEFAULT_SEASON_ID.to_string()),
            snapshot_path: env_var(SNAPSHOT_ENV),
            user_id: env_var("TORCHTALLY_USER"),
        }
    }
}
