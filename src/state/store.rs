use crate::state::league_state::LeagueState;
use crate::state::messages::{StoreCommand, StoreEvent, SyncRequest};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Single-owner actor over [`LeagueState`]. Commands arrive on a channel,
/// change events go out over a broadcast (subscribe with
/// `events.subscribe()`), and queued repository writes are forwarded to
/// the sync worker.
pub struct StoreWorker {
    state: LeagueState,
    commands: mpsc::Receiver<StoreCommand>,
    events: broadcast::Sender<StoreEvent>,
    sync_requests: mpsc::Sender<SyncRequest>,
}

impl StoreWorker {
    pub fn new(
        state: LeagueState,
        commands: mpsc::Receiver<StoreCommand>,
        events: broadcast::Sender<StoreEvent>,
        sync_requests: mpsc::Sender<SyncRequest>,
    ) -> Self {
        Self { state, commands, events, sync_requests }
    }

    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            debug!("store command: {command:?}");
            let mut extra_event = None;
            let outcome = match command {
                StoreCommand::ApplyConfig(config) => {
                    self.state.apply_config(config);
                    Ok(())
                }
                StoreCommand::ApplyPhases(phases) => {
                    self.state.apply_phases(phases);
                    Ok(())
                }
                StoreCommand::ApplySeasonState { active, activated } => {
                    self.state.apply_season_state(active, activated);
                    Ok(())
                }
                StoreCommand::ApplyResults(results) => {
                    self.state.apply_results(results);
                    Ok(())
                }
                StoreCommand::ApplyUsers(users) => {
                    self.state.apply_users(users);
                    Ok(())
                }
                StoreCommand::ApplySeasonPicks(picks) => {
                    self.state.apply_season_picks(picks);
                    Ok(())
                }
                StoreCommand::ApplyWeeklyPicks(picks) => {
                    self.state.apply_weekly_picks(picks);
                    Ok(())
                }
                StoreCommand::StartNewWeek => self.state.start_new_week().map(|week| {
                    extra_event = Some(StoreEvent::WeekStarted(week));
                }),
                StoreCommand::RecordWinners { episode_id, column_id, winners } => {
                    self.state.record_winners_by_column(episode_id, &column_id, winners)
                }
            };

            if let Err(err) = outcome {
                warn!("store rejected mutation: {err}");
                let _ = self.events.send(StoreEvent::Rejected(err.to_string()));
                continue;
            }

            for request in self.state.take_outbox() {
                if self.sync_requests.send(request).await.is_err() {
                    warn!("sync worker is gone; dropping outbound save");
                    break;
                }
            }

            if let Some(event) = extra_event {
                let _ = self.events.send(event);
            }
            let _ = self
                .events
                .send(StoreEvent::StandingsChanged(self.state.standings_table()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survivor_league::client::demo_snapshot;

    #[tokio::test]
    async fn applied_collections_broadcast_standings() {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = broadcast::channel(16);
        let (sync_tx, mut sync_rx) = mpsc::channel(16);

        let worker = StoreWorker::new(LeagueState::default(), command_rx, event_tx, sync_tx);
        let task = tokio::spawn(worker.run());

        // Feed the demo league in collection by collection, the way the
        // sync worker delivers a pull.
        let snapshot = demo_snapshot().expect("demo");
        let config = snapshot.config.as_ref().and_then(|c| c.model()).expect("config");
        let commands = vec![
            StoreCommand::ApplyConfig(config),
            StoreCommand::ApplyPhases(snapshot.phases.iter().filter_map(|p| p.model()).collect()),
            StoreCommand::ApplySeasonState {
                active: snapshot.state.active_phase(),
                activated: snapshot.state.activated_phases(),
            },
            StoreCommand::ApplyResults(
                snapshot.results.iter().filter_map(|r| r.model()).collect(),
            ),
            StoreCommand::ApplyUsers(snapshot.users.iter().filter_map(|u| u.model()).collect()),
            StoreCommand::ApplySeasonPicks(
                snapshot.season_picks.iter().filter_map(|p| p.model()).collect(),
            ),
            StoreCommand::ApplyWeeklyPicks(
                snapshot.weekly_picks.iter().filter_map(|p| p.model()).collect(),
            ),
        ];
        let command_count = commands.len();
        for command in commands {
            command_tx.send(command).await.expect("send");
        }
        drop(command_tx);
        task.await.expect("worker");

        let mut last_table = None;
        for _ in 0..command_count {
            match event_rx.recv().await.expect("event") {
                StoreEvent::StandingsChanged(table) => last_table = Some(table),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        let table = last_table.expect("standings");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].display_name, "Zac");

        // Remote snapshots never queue outbound saves.
        assert!(sync_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn recording_winners_queues_a_save_and_rebroadcasts() {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = broadcast::channel(8);
        let (sync_tx, mut sync_rx) = mpsc::channel(8);

        let mut state = LeagueState::default();
        state.apply_snapshot(&demo_snapshot().expect("demo"));
        let task = tokio::spawn(StoreWorker::new(state, command_rx, event_tx, sync_tx).run());

        command_tx
            .send(StoreCommand::RecordWinners {
                episode_id: 3,
                column_id: "IM".into(),
                winners: vec!["parvati_shallow".into()],
            })
            .await
            .expect("send");
        drop(command_tx);
        task.await.expect("worker");

        assert!(matches!(sync_rx.try_recv(), Ok(SyncRequest::SaveResult(result)) if result.id == 3));
        // Zac picked Parvati for week-3 immunity; the standings move.
        match event_rx.recv().await.expect("event") {
            StoreEvent::StandingsChanged(table) => {
                let zac = table.rows.iter().find(|r| r.display_name == "Zac").unwrap();
                assert_eq!(zac.breakdown.immunity_points, 9);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_column_is_rejected_not_applied() {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = broadcast::channel(8);
        let (sync_tx, mut sync_rx) = mpsc::channel(8);

        let mut state = LeagueState::default();
        state.apply_snapshot(&demo_snapshot().expect("demo"));
        let task = tokio::spawn(StoreWorker::new(state, command_rx, event_tx, sync_tx).run());

        command_tx
            .send(StoreCommand::RecordWinners {
                episode_id: 3,
                column_id: "ZZ".into(),
                winners: vec!["parvati_shallow".into()],
            })
            .await
            .expect("send");
        drop(command_tx);
        task.await.expect("worker");

        assert!(matches!(event_rx.recv().await, Ok(StoreEvent::Rejected(_))));
        assert!(sync_rx.try_recv().is_err());
    }
}
