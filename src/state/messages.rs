use crate::standings::StandingsTable;
use survivor_league::{
    EpisodeResult, PickPhase, SeasonConfig, SeasonPicks, UserProfile, WeeklyPicks,
};
use uuid::Uuid;

/// Work routed to the store actor: full-replacement snapshot applications
/// from the repository, plus the admin mutations available from the watch
/// console. All state changes flow through here so they serialize on one
/// task.
#[derive(Debug)]
pub enum StoreCommand {
    ApplyConfig(SeasonConfig),
    ApplyPhases(Vec<PickPhase>),
    ApplySeasonState { active: Option<Uuid>, activated: Vec<Uuid> },
    ApplyResults(Vec<EpisodeResult>),
    ApplyUsers(Vec<UserProfile>),
    ApplySeasonPicks(Vec<SeasonPicks>),
    ApplyWeeklyPicks(Vec<WeeklyPicks>),
    StartNewWeek,
    RecordWinners { episode_id: u32, column_id: String, winners: Vec<String> },
}

/// Change events broadcast to store subscribers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    StandingsChanged(StandingsTable),
    WeekStarted(u32),
    /// A mutation was rejected at the boundary (unknown category, missing
    /// episode, …). Recoverable; nothing was changed.
    Rejected(String),
}

/// Outbound repository work queued by store mutations.
#[derive(Debug, Clone)]
pub enum SyncRequest {
    PullAll,
    SaveConfig(SeasonConfig),
    SaveSeasonState { active: Option<Uuid>, activated: Vec<Uuid> },
    SavePhases(Vec<PickPhase>),
    DeletePhase(Uuid),
    SaveResult(EpisodeResult),
    SaveWeeklyPicks(WeeklyPicks),
    SaveSeasonPicks(SeasonPicks),
}

/// Repository results. Every loaded collection is a full-replacement
/// snapshot for its in-memory counterpart.
#[derive(Debug)]
pub enum SyncResponse {
    ConfigLoaded(SeasonConfig),
    SeasonStateLoaded { active: Option<Uuid>, activated: Vec<Uuid> },
    PhasesLoaded(Vec<PickPhase>),
    ResultsLoaded(Vec<EpisodeResult>),
    UsersLoaded(Vec<UserProfile>),
    SeasonPicksLoaded(Vec<SeasonPicks>),
    WeeklyPicksLoaded(Vec<WeeklyPicks>),
    Saved { what: &'static str },
    /// Surfaced to the user as retryable; the sync worker never retries on
    /// its own.
    Error { message: String },
}
