mod standings;
mod state;

use crate::standings::render;
use crate::state::league_state::LeagueState;
use crate::state::messages::{StoreCommand, StoreEvent, SyncRequest, SyncResponse};
use crate::state::refresher::PeriodicRefresher;
use crate::state::settings::AppSettings;
use crate::state::store::StoreWorker;
use crate::state::sync::{SyncWorker, perform_save};
use anyhow::bail;
use std::collections::BTreeSet;
use survivor_league::PickPhase;
use survivor_league::client::{LeagueApi, demo_snapshot, load_snapshot_file};
use survivor_league::{SeasonPicks, WeeklyPicks};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug)]
enum Command {
    Standings,
    Watch,
    StartWeek,
    Record { episode: u32, column: String, winners: Vec<String> },
    Pick { episode: u32, column: String, picks: Vec<String> },
    Season { track: String, picks: Vec<String> },
    Phase(PhaseCommand),
}

#[derive(Debug)]
enum PhaseCommand {
    CreateDefaults,
    Activate(Uuid),
    Delete(Uuid),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let Some(command) = handle_cli_args() else {
        return Ok(());
    };
    let settings = AppSettings::load();

    match command {
        Command::Standings => run_standings(&settings).await,
        Command::Watch => run_watch(&settings).await,
        Command::StartWeek => run_start_week(&settings).await,
        Command::Record { episode, column, winners } => {
            run_record(&settings, episode, &column, winners).await
        }
        Command::Pick { episode, column, picks } => {
            run_pick(&settings, episode, &column, picks).await
        }
        Command::Season { track, picks } => run_season(&settings, &track, picks).await,
        Command::Phase(action) => run_phase(&settings, action).await,
    }
}

fn handle_cli_args() -> Option<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let contestant_list = |raw: Option<&String>| -> Vec<String> {
        raw.map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    };
    match args.first().map(String::as_str) {
        None => Some(Command::Standings),
        Some("watch") => Some(Command::Watch),
        Some("start-week") => Some(Command::StartWeek),
        Some("record") => {
            let (Some(episode), Some(column)) =
                (args.get(1).and_then(|a| a.parse().ok()), args.get(2))
            else {
                exit_usage("record needs an episode number and a column id");
            };
            Some(Command::Record {
                episode,
                column: column.clone(),
                winners: contestant_list(args.get(3)),
            })
        }
        Some("pick") => {
            let (Some(episode), Some(column)) =
                (args.get(1).and_then(|a| a.parse().ok()), args.get(2))
            else {
                exit_usage("pick needs an episode number and a column id");
            };
            Some(Command::Pick {
                episode,
                column: column.clone(),
                picks: contestant_list(args.get(3)),
            })
        }
        Some("season") => {
            let Some(track) = args.get(1) else {
                exit_usage("season needs a track (merge | final-three | winner)");
            };
            Some(Command::Season { track: track.clone(), picks: contestant_list(args.get(2)) })
        }
        Some("phase") => {
            let action = match (args.get(1).map(String::as_str), args.get(2)) {
                (Some("create-defaults"), _) => PhaseCommand::CreateDefaults,
                (Some("activate"), Some(id)) => match Uuid::parse_str(id) {
                    Ok(id) => PhaseCommand::Activate(id),
                    Err(_) => exit_usage("phase activate needs a phase id (uuid)"),
                },
                (Some("delete"), Some(id)) => match Uuid::parse_str(id) {
                    Ok(id) => PhaseCommand::Delete(id),
                    Err(_) => exit_usage("phase delete needs a phase id (uuid)"),
                },
                _ => exit_usage("phase needs an action (create-defaults | activate | delete)"),
            };
            Some(Command::Phase(action))
        }
        Some("-h" | "--help") => {
            println!("{}", usage_text());
            None
        }
        Some("-V" | "--version") => {
            println!("torchtally {}", env!("CARGO_PKG_VERSION"));
            None
        }
        Some(other) => exit_usage(&format!("Unknown argument: {other}")),
    }
}

fn exit_usage(message: &str) -> ! {
    eprintln!("{message}\n\n{}", usage_text());
    std::process::exit(2);
}

fn usage_text() -> &'static str {
    "torchtally - Survivor fantasy league scoring companion

Usage:
  torchtally                          Print the current standings
  torchtally watch                    Follow the league; admin console on stdin
  torchtally start-week               (admin) Open the next week
  torchtally record <ep> <col> <ids>  (admin) Record winners, e.g. record 3 VO q
  torchtally pick <ep> <col> <ids>    Save your weekly picks for a category
  torchtally season <track> <ids>     Save merge | final-three | winner picks
  torchtally phase create-defaults    (admin) Create the stock phase templates
  torchtally phase activate <id>      (admin) Activate a phase for new weeks
  torchtally phase delete <id>        (admin) Delete a never-activated phase
  torchtally --help
  torchtally --version

<ids> is a comma-separated list of contestant ids.

Environment:
  TORCHTALLY_API_URL      League document API base URL (required to sync)
  TORCHTALLY_SEASON_ID    Season to follow (default season-001)
  TORCHTALLY_SEASON_JSON  Path to a local league snapshot JSON
  TORCHTALLY_USER         Your league member id, used by pick commands"
}

fn api_client(settings: &AppSettings) -> Option<LeagueApi> {
    settings
        .api_url
        .as_deref()
        .map(|url| LeagueApi::new(url, &settings.season_id))
}

fn require_api(settings: &AppSettings) -> anyhow::Result<LeagueApi> {
    match api_client(settings) {
        Some(api) => Ok(api),
        None => bail!("this command syncs with the league; set TORCHTALLY_API_URL first"),
    }
}

fn require_user(settings: &AppSettings) -> anyhow::Result<String> {
    match &settings.user_id {
        Some(user) => Ok(user.clone()),
        None => bail!("set TORCHTALLY_USER to your league member id first"),
    }
}

/// Load the whole league into a fresh state aggregate.
async fn pull_state(api: &LeagueApi) -> anyhow::Result<LeagueState> {
    let mut state = LeagueState::default();
    if let Some(config) = api.fetch_config().await? {
        state.apply_config(config);
    }
    state.apply_phases(api.fetch_phases().await?);
    let (active, activated) = api.fetch_season_state().await?;
    state.apply_season_state(active, activated);
    state.apply_results(api.fetch_results().await?);
    state.apply_users(api.fetch_users().await?);
    state.apply_season_picks(api.fetch_season_picks(None).await?);
    state.apply_weekly_picks(api.fetch_weekly_picks(None).await?);
    Ok(state)
}

async fn local_state(settings: &AppSettings) -> anyhow::Result<LeagueState> {
    let snapshot = match &settings.snapshot_path {
        Some(path) => load_snapshot_file(path)?,
        None => demo_snapshot()?,
    };
    let mut state = LeagueState::default();
    state.apply_snapshot(&snapshot);
    Ok(state)
}

async fn load_state(settings: &AppSettings) -> anyhow::Result<LeagueState> {
    match api_client(settings) {
        Some(api) => pull_state(&api).await,
        None => local_state(settings).await,
    }
}

/// Push everything a mutation queued, failing loudly on the first error so
/// the admin can retry.
async fn flush_outbox(api: &LeagueApi, requests: Vec<SyncRequest>) -> anyhow::Result<()> {
    for request in requests {
        if let SyncResponse::Saved { what } = perform_save(api, request).await? {
            debug!("saved {what}");
        }
    }
    Ok(())
}

async fn run_standings(settings: &AppSettings) -> anyhow::Result<()> {
    let state = load_state(settings).await?;
    print!("{}", render(&state.standings_table()));
    Ok(())
}

async fn run_start_week(settings: &AppSettings) -> anyhow::Result<()> {
    let api = require_api(settings)?;
    let mut state = pull_state(&api).await?;
    let week = state.start_new_week()?;
    flush_outbox(&api, state.take_outbox()).await?;
    println!("Week {week} is open for picks.");
    Ok(())
}

async fn run_record(
    settings: &AppSettings,
    episode: u32,
    column: &str,
    winners: Vec<String>,
) -> anyhow::Result<()> {
    let api = require_api(settings)?;
    let mut state = pull_state(&api).await?;
    state.record_winners_by_column(episode, column, winners)?;
    flush_outbox(&api, state.take_outbox()).await?;
    print!("{}", render(&state.standings_table()));
    Ok(())
}

async fn run_pick(
    settings: &AppSettings,
    episode: u32,
    column: &str,
    picks: Vec<String>,
) -> anyhow::Result<()> {
    let api = require_api(settings)?;
    let user = require_user(settings)?;
    let mut state = pull_state(&api).await?;

    let Some(category) = state.category_by_column(episode, column).cloned() else {
        bail!("no category with column id \"{column}\" governs episode {episode}");
    };
    if !state.is_category_editable_for(&user, episode, category.id) {
        bail!(
            "\"{}\" is locked; its selection was fixed in an earlier week",
            category.name
        );
    }

    let mut weekly = state
        .weekly_picks
        .get(&user)
        .and_then(|by_episode| by_episode.get(&episode))
        .cloned()
        .unwrap_or_else(|| WeeklyPicks::new(&user, episode));
    weekly.set_selections(&category, picks.into_iter().collect::<BTreeSet<String>>());
    weekly.is_submitted = true;

    let carried_forward = state.save_weekly_picks(weekly)?;
    if carried_forward {
        println!("Locked selections were carried forward from an earlier week.");
    }
    flush_outbox(&api, state.take_outbox()).await?;
    print!("{}", render(&state.standings_table()));
    Ok(())
}

async fn run_season(
    settings: &AppSettings,
    track: &str,
    picks: Vec<String>,
) -> anyhow::Result<()> {
    let api = require_api(settings)?;
    let user = require_user(settings)?;
    let mut state = pull_state(&api).await?;

    let mut season_picks = state
        .season_picks
        .get(&user)
        .cloned()
        .unwrap_or_else(|| SeasonPicks::new(&user));
    let selection: BTreeSet<String> = picks.iter().cloned().collect();

    match track {
        "merge" => {
            if !season_picks.set_merge_picks(selection) {
                bail!("the merge track allows at most three picks");
            }
        }
        "final-three" | "final3" => {
            if !season_picks.set_final_three_picks(selection) {
                bail!("the final-three track allows at most three picks");
            }
        }
        "winner" => {
            season_picks.winner_pick = picks.into_iter().next();
        }
        other => bail!("unknown season track \"{other}\" (merge | final-three | winner)"),
    }

    state.save_season_picks(season_picks);
    flush_outbox(&api, state.take_outbox()).await?;
    print!("{}", render(&state.standings_table()));
    Ok(())
}

async fn run_phase(settings: &AppSettings, action: PhaseCommand) -> anyhow::Result<()> {
    let api = require_api(settings)?;
    let mut state = pull_state(&api).await?;

    match action {
        PhaseCommand::CreateDefaults => {
            for phase in PickPhase::preconfigured() {
                let name = phase.name.clone();
                let id = phase.id;
                state.save_phase(phase)?;
                println!("Created phase \"{name}\" ({id}).");
            }
        }
        PhaseCommand::Activate(id) => {
            state.activate_phase(id)?;
            println!("Phase {id} is active; new weeks will score with it.");
        }
        PhaseCommand::Delete(id) => {
            state.delete_phase(id)?;
            println!("Phase {id} deleted.");
        }
    }

    flush_outbox(&api, state.take_outbox()).await?;
    Ok(())
}

async fn run_watch(settings: &AppSettings) -> anyhow::Result<()> {
    let api = require_api(settings)?;

    let (store_tx, store_rx) = mpsc::channel::<StoreCommand>(100);
    let (sync_tx, sync_rx) = mpsc::channel::<SyncRequest>(100);
    let (response_tx, mut response_rx) = mpsc::channel::<SyncResponse>(100);
    let (event_tx, mut events) = broadcast::channel::<StoreEvent>(100);

    let store_task = tokio::spawn(
        StoreWorker::new(LeagueState::default(), store_rx, event_tx, sync_tx.clone()).run(),
    );
    let sync_task = tokio::spawn(SyncWorker::new(api, sync_rx, response_tx).run());
    let refresher_task = tokio::spawn(PeriodicRefresher::new(sync_tx.clone()).run());

    let _ = sync_tx.send(SyncRequest::PullAll).await;
    println!("Watching the league. Console: standings | start-week | record <ep> <col> <ids> | quit");

    let mut console = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(response) = response_rx.recv() => {
                match response {
                    SyncResponse::Error { message } => {
                        warn!("sync error (will retry on the next pull): {message}");
                    }
                    SyncResponse::Saved { what } => debug!("saved {what}"),
                    loaded => {
                        let Some(command) = store_command_for(loaded) else { continue };
                        if store_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                }
            }

            event = events.recv() => match event {
                Ok(StoreEvent::StandingsChanged(table)) => print!("{}", render(&table)),
                Ok(StoreEvent::WeekStarted(week)) => println!("Week {week} is open for picks."),
                Ok(StoreEvent::Rejected(reason)) => warn!("rejected: {reason}"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("skipped {skipped} store events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            line = console.next_line() => match line {
                Ok(Some(input)) => {
                    if !handle_console_line(input.trim(), &store_tx, &sync_tx).await {
                        break;
                    }
                }
                _ => break,
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    store_task.abort();
    sync_task.abort();
    refresher_task.abort();
    Ok(())
}

/// One line of the watch console. Returns false to quit.
async fn handle_console_line(
    input: &str,
    store_tx: &mpsc::Sender<StoreCommand>,
    sync_tx: &mpsc::Sender<SyncRequest>,
) -> bool {
    let parts: Vec<&str> = input.split_whitespace().collect();
    match parts.as_slice() {
        [] => true,
        ["quit"] | ["exit"] | ["q"] => false,
        ["standings"] | ["refresh"] => {
            let _ = sync_tx.send(SyncRequest::PullAll).await;
            true
        }
        ["start-week"] => {
            let _ = store_tx.send(StoreCommand::StartNewWeek).await;
            true
        }
        ["record", episode, column, rest @ ..] => {
            match episode.parse::<u32>() {
                Ok(episode_id) => {
                    let winners = rest
                        .iter()
                        .flat_map(|chunk| chunk.split(','))
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect();
                    let _ = store_tx
                        .send(StoreCommand::RecordWinners {
                            episode_id,
                            column_id: column.to_string(),
                            winners,
                        })
                        .await;
                }
                Err(_) => println!("record needs an episode number, e.g. record 3 VO q"),
            }
            true
        }
        _ => {
            println!("commands: standings | start-week | record <ep> <col> <ids> | quit");
            true
        }
    }
}

fn store_command_for(response: SyncResponse) -> Option<StoreCommand> {
    match response {
        SyncResponse::ConfigLoaded(config) => Some(StoreCommand::ApplyConfig(config)),
        SyncResponse::SeasonStateLoaded { active, activated } => {
            Some(StoreCommand::ApplySeasonState { active, activated })
        }
        SyncResponse::PhasesLoaded(phases) => Some(StoreCommand::ApplyPhases(phases)),
        SyncResponse::ResultsLoaded(results) => Some(StoreCommand::ApplyResults(results)),
        SyncResponse::UsersLoaded(users) => Some(StoreCommand::ApplyUsers(users)),
        SyncResponse::SeasonPicksLoaded(picks) => Some(StoreCommand::ApplySeasonPicks(picks)),
        SyncResponse::WeeklyPicksLoaded(picks) => Some(StoreCommand::ApplyWeeklyPicks(picks)),
        SyncResponse::Saved { .. } | SyncResponse::Error { .. } => None,
    }
}
