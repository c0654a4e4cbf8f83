use crate::state::messages::{SyncRequest, SyncResponse};
use survivor_league::client::{ApiError, LeagueApi};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Async repository worker. Pulls arrive collection by collection (each one
/// a full-replacement snapshot); saves are queued by the store and
/// performed once, with failures surfaced as retryable responses.
pub struct SyncWorker {
    client: LeagueApi,
    requests: mpsc::Receiver<SyncRequest>,
    responses: mpsc::Sender<SyncResponse>,
}

impl SyncWorker {
    pub fn new(
        client: LeagueApi,
        requests: mpsc::Receiver<SyncRequest>,
        responses: mpsc::Sender<SyncResponse>,
    ) -> Self {
        Self { client, requests, responses }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            match request {
                SyncRequest::PullAll => {
                    debug!("pulling league collections");
                    if !self.pull_all().await {
                        break;
                    }
                }
                save => {
                    let response = perform_save(&self.client, save)
                        .await
                        .unwrap_or_else(|err| SyncResponse::Error { message: err.to_string() });
                    if self.responses.send(response).await.is_err() {
                        error!("store loop is gone; stopping sync worker");
                        break;
                    }
                }
            }
        }
    }

    /// Fetch every collection, forwarding each as it lands. Returns false
    /// once the response channel closes.
    async fn pull_all(&self) -> bool {
        let responses = [
            match self.client.fetch_config().await {
                Ok(Some(config)) => Some(SyncResponse::ConfigLoaded(config)),
                Ok(None) => {
                    debug!("no season config document yet");
                    None
                }
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
            match self.client.fetch_phases().await {
                Ok(phases) => Some(SyncResponse::PhasesLoaded(phases)),
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
            match self.client.fetch_season_state().await {
                Ok((active, activated)) => {
                    Some(SyncResponse::SeasonStateLoaded { active, activated })
                }
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
            match self.client.fetch_results().await {
                Ok(results) => Some(SyncResponse::ResultsLoaded(results)),
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
            match self.client.fetch_users().await {
                Ok(users) => Some(SyncResponse::UsersLoaded(users)),
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
            match self.client.fetch_season_picks(None).await {
                Ok(picks) => Some(SyncResponse::SeasonPicksLoaded(picks)),
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
            match self.client.fetch_weekly_picks(None).await {
                Ok(picks) => Some(SyncResponse::WeeklyPicksLoaded(picks)),
                Err(err) => Some(SyncResponse::Error { message: err.to_string() }),
            },
        ];

        for response in responses.into_iter().flatten() {
            if self.responses.send(response).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Perform one queued save. Shared with the one-shot CLI commands, which
/// flush the store outbox directly.
pub async fn perform_save(
    client: &LeagueApi,
    request: SyncRequest,
) -> Result<SyncResponse, ApiError> {
    let what = match request {
        SyncRequest::PullAll => return Ok(SyncResponse::Saved { what: "nothing" }),
        SyncRequest::SaveConfig(config) => {
            client.save_config(&config).await?;
            "config"
        }
        SyncRequest::SaveSeasonState { active, activated } => {
            client.save_season_state(active, &activated).await?;
            "season state"
        }
        SyncRequest::SavePhases(phases) => {
            client.save_phases(&phases).await?;
            "phases"
        }
        SyncRequest::DeletePhase(phase_id) => {
            client.delete_phase(phase_id).await?;
            "phase deletion"
        }
        SyncRequest::SaveResult(result) => {
            client.save_result(&result).await?;
            "result"
        }
        SyncRequest::SaveWeeklyPicks(picks) => {
            client.save_weekly_picks(&picks).await?;
            "weekly picks"
        }
        SyncRequest::SaveSeasonPicks(picks) => {
            client.save_season_picks(&picks).await?;
            "season picks"
        }
    };
    debug!("saved {what}");
    Ok(SyncResponse::Saved { what })
}
