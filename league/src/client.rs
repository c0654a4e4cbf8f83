use crate::docs::{
    EpisodeResultDocument, LeagueSnapshot, PhaseDocument, SeasonConfigDocument,
    SeasonPicksDocument, SeasonStateDocument, UserDocument, WeeklyPicksDocument,
};
use crate::{EpisodeResult, PickPhase, SeasonConfig, SeasonPicks, UserProfile, WeeklyPicks};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub type ApiResult<T> = Result<T, ApiError>;

pub const DEFAULT_SEASON_ID: &str = "season-001";
/// Path to a local league snapshot JSON file, overriding the remote store.
pub const SNAPSHOT_ENV: &str = "TORCHTALLY_SEASON_JSON";
const DEMO_SEASON_JSON: &str = include_str!("../../demo_season.json");

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    Decode(String),
    NotFound(String),
    Upload(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::Decode(msg) => write!(f, "Decode error: {msg}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Upload(msg) => write!(f, "Upload error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// League repository client backed by a document-per-collection HTTP API.
/// Every load is a full-replacement snapshot of its collection; malformed
/// documents are dropped, never fatal.
#[derive(Debug, Clone)]
pub struct LeagueApi {
    client: Client,
    base_url: String,
    season_id: String,
    timeout: Duration,
}

impl LeagueApi {
    pub fn new(base_url: &str, season_id: &str) -> Self {
        Self {
            client: Client::builder()
                .user_agent("torchtally/0.1 (league companion)")
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            season_id: season_id.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    fn season_url(&self, suffix: &str) -> String {
        format!("{}/seasons/{}{suffix}", self.base_url, self.season_id)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn fetch_config(&self) -> ApiResult<Option<SeasonConfig>> {
        let url = self.season_url("");
        let raw: SeasonConfigDocument = self.get(&url).await?;
        Ok(raw.model())
    }

    pub async fn fetch_season_state(&self) -> ApiResult<(Option<Uuid>, Vec<Uuid>)> {
        let url = self.season_url("/state");
        let raw: SeasonStateDocument = self.get(&url).await?;
        Ok((raw.active_phase(), raw.activated_phases()))
    }

    /// Phases in admin order (sortIndex ascending, unsorted documents last).
    pub async fn fetch_phases(&self) -> ApiResult<Vec<PickPhase>> {
        let url = self.season_url("/phases");
        let mut raw: Vec<PhaseDocument> = self.get(&url).await?;
        raw.sort_by_key(|d| d.sort_index.unwrap_or(i32::MAX));
        Ok(raw.iter().filter_map(PhaseDocument::model).collect())
    }

    pub async fn fetch_results(&self) -> ApiResult<Vec<EpisodeResult>> {
        let url = self.season_url("/results");
        let raw: Vec<EpisodeResultDocument> = self.get(&url).await?;
        let mut results: Vec<EpisodeResult> =
            raw.iter().filter_map(EpisodeResultDocument::model).collect();
        results.sort_by_key(|r| r.id);
        Ok(results)
    }

    pub async fn fetch_users(&self) -> ApiResult<Vec<UserProfile>> {
        let url = self.season_url("/users");
        let raw: Vec<UserDocument> = self.get(&url).await?;
        let mut users: Vec<UserProfile> = raw.iter().filter_map(UserDocument::model).collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }

    pub async fn fetch_season_picks(&self, user_id: Option<&str>) -> ApiResult<Vec<SeasonPicks>> {
        let mut url = self.season_url("/season-picks");
        if let Some(user_id) = user_id {
            url.push_str(&format!("?user={user_id}"));
        }
        let raw: Vec<SeasonPicksDocument> = self.get(&url).await?;
        Ok(raw.iter().filter_map(SeasonPicksDocument::model).collect())
    }

    pub async fn fetch_weekly_picks(&self, user_id: Option<&str>) -> ApiResult<Vec<WeeklyPicks>> {
        let mut url = self.season_url("/weekly-picks");
        if let Some(user_id) = user_id {
            url.push_str(&format!("?user={user_id}"));
        }
        let raw: Vec<WeeklyPicksDocument> = self.get(&url).await?;
        Ok(raw.iter().filter_map(WeeklyPicksDocument::model).collect())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn save_config(&self, config: &SeasonConfig) -> ApiResult<()> {
        let url = self.season_url("");
        self.put(&url, &SeasonConfigDocument::from_model(config)).await
    }

    pub async fn save_season_state(
        &self,
        active: Option<Uuid>,
        activated: &[Uuid],
    ) -> ApiResult<()> {
        let url = self.season_url("/state");
        self.put(&url, &SeasonStateDocument::from_state(active, activated)).await
    }

    pub async fn save_phases(&self, phases: &[PickPhase]) -> ApiResult<()> {
        let url = self.season_url("/phases");
        let docs: Vec<PhaseDocument> = phases
            .iter()
            .enumerate()
            .map(|(index, phase)| PhaseDocument::from_model(phase, index as i32))
            .collect();
        self.put(&url, &docs).await
    }

    pub async fn delete_phase(&self, phase_id: Uuid) -> ApiResult<()> {
        let url = self.season_url(&format!("/phases/{phase_id}"));
        let response = self
            .client
            .delete(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.clone()))?;
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| ApiError::Api(e, url))
    }

    pub async fn save_result(&self, result: &EpisodeResult) -> ApiResult<()> {
        let url = self.season_url(&format!("/results/{}", result.id));
        self.put(&url, &EpisodeResultDocument::from_model(result)).await
    }

    pub async fn save_season_picks(&self, picks: &SeasonPicks) -> ApiResult<()> {
        let url = self.season_url(&format!("/season-picks/{}", picks.user_id));
        self.put(&url, &SeasonPicksDocument::from_model(picks)).await
    }

    pub async fn save_weekly_picks(&self, picks: &WeeklyPicks) -> ApiResult<()> {
        let url = self.season_url(&format!(
            "/weekly-picks/{}/{}",
            picks.user_id, picks.episode_id
        ));
        self.put(&url, &WeeklyPicksDocument::from_model(picks)).await
    }

    /// Upload raw avatar bytes under a sanitized asset name. Returns the
    /// canonical name the store filed the asset under.
    pub async fn upload_avatar(&self, asset_name: &str, bytes: Vec<u8>) -> ApiResult<String> {
        let asset = sanitize_asset_name(asset_name)?;
        let url = self.season_url(&format!("/avatars/{asset}"));

        #[derive(Default, serde::Deserialize)]
        struct UploadResponse {
            asset: Option<String>,
        }

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.clone()))?;
        let response = response
            .error_for_status()
            .map_err(|e| ApiError::Upload(format!("upload rejected for {url}: {e}")))?;

        let parsed: UploadResponse = response.json().await.unwrap_or_default();
        Ok(parsed.asset.unwrap_or(asset))
    }

    pub fn avatar_url(&self, asset_name: &str) -> String {
        self.season_url(&format!("/avatars/{asset_name}"))
    }

    async fn get<T: Default + serde::de::DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        match response.error_for_status() {
            Ok(res) => res
                .json::<T>()
                .await
                .map_err(|e| ApiError::Parsing(e, url.to_owned())),
            Err(e) => {
                if e.status().map(|s| s.is_client_error()).unwrap_or(false) {
                    Ok(T::default())
                } else {
                    Err(ApiError::Api(e, url.to_owned()))
                }
            }
        }
    }

    async fn put<B: serde::Serialize>(&self, url: &str, body: &B) -> ApiResult<()> {
        let response = self
            .client
            .put(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| ApiError::Api(e, url.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Local snapshots
// ---------------------------------------------------------------------------

pub fn load_snapshot_file(path: &str) -> ApiResult<LeagueSnapshot> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ApiError::NotFound(format!("could not read {path}: {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| ApiError::Decode(format!("invalid league snapshot at {path}: {e}")))
}

pub fn demo_snapshot() -> ApiResult<LeagueSnapshot> {
    serde_json::from_str(DEMO_SEASON_JSON)
        .map_err(|e| ApiError::Decode(format!("invalid embedded demo season: {e}")))
}

/// Lowercase, spaces to dashes, everything outside `[a-z0-9._-]` stripped.
pub fn sanitize_asset_name(raw: &str) -> ApiResult<String> {
    let mut sanitized = String::with_capacity(raw.len());
    for c in raw.trim().to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => sanitized.push(c),
            ' ' => sanitized.push('-'),
            _ => {}
        }
    }
    if sanitized.is_empty() {
        Err(ApiError::Upload(format!(
            "asset name \"{raw}\" has no usable characters"
        )))
    } else {
        Ok(sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_dashes_spaces() {
        assert_eq!(sanitize_asset_name("Boston Rob.PNG").unwrap(), "boston-rob.png");
        assert_eq!(sanitize_asset_name("  q_2025 ").unwrap(), "q_2025");
        assert_eq!(sanitize_asset_name("tribe/čhief!").unwrap(), "tribehief");
    }

    #[test]
    fn sanitize_rejects_names_with_nothing_left() {
        assert!(sanitize_asset_name("***").is_err());
        assert!(sanitize_asset_name("   ").is_err());
    }

    #[test]
    fn demo_season_snapshot_parses() {
        let snapshot = demo_snapshot().expect("demo season should parse");
        let config = snapshot.config.expect("demo config").model().expect("config model");
        assert!(!config.contestants.is_empty());
        assert!(!snapshot.phases.is_empty());
        assert!(!snapshot.users.is_empty());
    }

    #[tokio::test]
    async fn fetch_phases_sorts_and_drops_malformed_documents() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            {
                "id": "00000000-0000-0000-0000-000000000102",
                "name": "Post-merge",
                "sortIndex": 1,
                "categories": []
            },
            { "name": "No id at all", "sortIndex": 0, "categories": [] },
            {
                "id": "00000000-0000-0000-0000-000000000101",
                "name": "Pre-merge",
                "sortIndex": 0,
                "categories": [
                    { "name": "Orphan category without an id" },
                    {
                        "id": "00000000-0000-0000-0000-000000000001",
                        "name": "Voted Out",
                        "columnId": "vo",
                        "totalPicks": 2,
                        "pointsPerCorrectPick": 3,
                        "kind": "votedOut"
                    }
                ]
            }
        ]);
        let _mock = server
            .mock("GET", "/seasons/season-001/phases")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let api = LeagueApi::new(&server.url(), DEFAULT_SEASON_ID);
        let phases = api.fetch_phases().await.expect("phases");

        let names: Vec<&str> = phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Pre-merge", "Post-merge"]);
        // The id-less category was dropped; the survivor was normalized.
        assert_eq!(phases[0].categories.len(), 1);
        assert_eq!(phases[0].categories[0].column_id, "VO");
    }

    #[tokio::test]
    async fn missing_collections_read_as_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/seasons/season-001/results")
            .with_status(404)
            .create_async()
            .await;

        let api = LeagueApi::new(&server.url(), DEFAULT_SEASON_ID);
        let results = api.fetch_results().await.expect("results");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn save_result_puts_to_the_episode_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/seasons/season-001/results/4")
            .with_status(204)
            .create_async()
            .await;

        let api = LeagueApi::new(&server.url(), DEFAULT_SEASON_ID);
        let result = EpisodeResult::new(4, None);
        api.save_result(&result).await.expect("save");
        mock.assert_async().await;
    }
}
