//! Concurrency tests for the session synchronization server
//!
//! Many handlers run at once against one engine; these tests check that the
//! registries and per-entity locks keep every invariant under contention.

use server::config::{BallCommit, ServerConfig};
use server::engine::Engine;
use server::lifecycle::Expirable;
use server::roster::Session;
use shared::protocol::*;
use shared::BallState;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Barrier};
use std::thread;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn shared_engine(ball_commit: BallCommit) -> Arc<Engine> {
    Arc::new(Engine::new(ServerConfig {
        ball_commit,
        ..ServerConfig::seeded(99)
    }))
}

/// Runs `work` on `threads` threads released together
fn race<T, F>(threads: usize, work: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let work = Arc::new(work);
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let work = Arc::clone(&work);
            thread::spawn(move || {
                barrier.wait();
                work(i)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// BALL AUTHORITY UNDER CONTENTION
mod ball_tests {
    use super::*;

    #[test]
    fn concurrent_registration_accepts_exactly_one() {
        let engine = shared_engine(BallCommit::Serialized);
        let game_id = engine.create_game().unwrap().id().to_string();

        let results = {
            let engine = Arc::clone(&engine);
            let game_id = game_id.clone();
            race(16, move |i| {
                engine.handle_ball_state(
                    addr(10_000 + i as u16),
                    BallStateMessage {
                        ball: BallState::default(),
                        game_id: game_id.clone(),
                    },
                )
            })
        };

        let accepted: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(accepted.len(), 1);
        for rejected in results.iter().filter(|r| r.is_err()) {
            let err = rejected.as_ref().err().unwrap();
            assert_eq!(err.kind_name(), "Denied");
        }

        let game = engine.games().lookup(game_id.as_str()).unwrap();
        let stored = game.ball().unwrap();
        let reply = accepted[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(stored.guid, reply.ball.guid);
    }

    #[test]
    fn concurrent_identical_touches_commit_once() {
        let engine = shared_engine(BallCommit::Serialized);
        let game = engine.create_game().unwrap();
        let game_id = game.id().to_string();

        let registered = engine
            .handle_ball_state(
                addr(11_000),
                BallStateMessage {
                    ball: BallState::default(),
                    game_id: game_id.clone(),
                },
            )
            .unwrap()
            .unwrap()
            .ball;

        // everyone advances 1 -> 2 at once; only the first can follow the count
        engine
            .handle_ball_state(
                addr(11_000),
                BallStateMessage {
                    ball: BallState {
                        touch_count: 1,
                        ..registered.clone()
                    },
                    game_id: game_id.clone(),
                },
            )
            .unwrap();

        let results = {
            let engine = Arc::clone(&engine);
            let game_id = game_id.clone();
            race(8, move |i| {
                engine.handle_ball_state(
                    addr(11_001 + i as u16),
                    BallStateMessage {
                        ball: BallState {
                            touch_count: 2,
                            ..registered.clone()
                        },
                        game_id: game_id.clone(),
                    },
                )
            })
        };

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(game.ball().unwrap().touch_count, 2);
    }

    #[test]
    fn last_writer_wins_keeps_a_single_ball() {
        let engine = shared_engine(BallCommit::LastWriterWins);
        let game = engine.create_game().unwrap();
        let game_id = game.id().to_string();

        let results = {
            let engine = Arc::clone(&engine);
            race(8, move |i| {
                engine.handle_ball_state(
                    addr(12_000 + i as u16),
                    BallStateMessage {
                        ball: BallState::default(),
                        game_id: game_id.clone(),
                    },
                )
            })
        };

        assert!(results.iter().any(|r| r.is_ok()));
        let stored = game.ball().unwrap();
        assert!(stored.has_id());
        assert!(stored.is_alive());
    }
}

/// SESSIONS UNDER CONTENTION
mod session_tests {
    use super::*;

    #[test]
    fn concurrent_lobby_creation_yields_unique_codes() {
        let engine = shared_engine(BallCommit::Serialized);

        let codes = {
            let engine = Arc::clone(&engine);
            race(8, move |_| {
                (0..50)
                    .map(|_| engine.create_lobby().unwrap().room_code().to_string())
                    .collect::<Vec<_>>()
            })
        };

        let all: Vec<String> = codes.into_iter().flatten().collect();
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(all.len(), 400);
        assert_eq!(unique.len(), 400);
        assert_eq!(engine.lobbies().len(), 400);
        assert!(all.iter().all(|code| shared::is_valid_room_code(code)));
    }

    #[test]
    fn concurrent_joins_elect_one_host() {
        let engine = shared_engine(BallCommit::Serialized);
        let code = engine.create_lobby().unwrap().room_code().to_string();

        let ids: Vec<String> = (0..12)
            .map(|i| {
                let port = 13_000 + i;
                engine.connections().register(addr(port));
                engine.admit(addr(port), Default::default()).unwrap().id().to_string()
            })
            .collect();

        let results = {
            let engine = Arc::clone(&engine);
            let ids = ids.clone();
            let code = code.clone();
            race(12, move |i| {
                engine.handle_add_player_lobby(
                    addr(13_000 + i as u16),
                    AddPlayerLobbyMessage {
                        server_player_id: ids[i].clone(),
                        room_code: code.clone(),
                        ..Default::default()
                    },
                )
            })
        };
        assert!(results.iter().all(|r| r.is_ok()));

        let lobby = engine.lobbies().lookup(code.as_str()).unwrap();
        let members = lobby.members();
        assert_eq!(members.len(), 12);
        let host = lobby.host().unwrap();
        assert!(members.contains(&host));
    }

    #[test]
    fn concurrent_leave_and_disconnect_remove_once() {
        let engine = shared_engine(BallCommit::Serialized);
        let game = engine.create_game().unwrap();
        let game_id = game.id().to_string();

        let player = engine.admit(addr(14_000), Default::default()).unwrap();
        let player_id = player.id().to_string();
        engine
            .handle_add_player_game(
                addr(14_000),
                AddPlayerGameMessage {
                    server_player_id: player_id.clone(),
                    game_id: game_id.clone(),
                    ..Default::default()
                },
            )
            .unwrap();

        let removals = {
            let engine = Arc::clone(&engine);
            race(6, move |i| {
                if i % 2 == 0 {
                    engine.remove_player_from_game(&player_id, &game_id)
                } else {
                    engine.disconnect(addr(14_000)) > 0
                }
            })
        };

        assert!(removals.iter().any(|removed| *removed));
        assert!(engine.players().is_empty());
        assert!(engine.games().is_empty());
        assert!(!game.watcher().is_armed());
    }

    #[test]
    fn hosts_stay_members_while_players_churn() {
        let engine = shared_engine(BallCommit::Serialized);
        let game = engine.create_game().unwrap();
        let game_id = game.id().to_string();

        // an anchor keeps the game alive while the others come and go
        let anchor = engine.admit(addr(15_000), Default::default()).unwrap();
        engine
            .handle_add_player_game(
                addr(15_000),
                AddPlayerGameMessage {
                    server_player_id: anchor.id().to_string(),
                    game_id: game_id.clone(),
                    ..Default::default()
                },
            )
            .unwrap();

        {
            let engine = Arc::clone(&engine);
            let game_id = game_id.clone();
            race(8, move |i| {
                let port = 15_001 + i as u16;
                for _ in 0..20 {
                    let player = engine.admit(addr(port), Default::default()).unwrap();
                    engine
                        .handle_add_player_game(
                            addr(port),
                            AddPlayerGameMessage {
                                server_player_id: player.id().to_string(),
                                game_id: game_id.clone(),
                                ..Default::default()
                            },
                        )
                        .unwrap();
                    engine.remove_player_from_game(player.id(), &game_id);
                }
            });
        }

        assert_eq!(game.members(), vec![anchor.id().to_string()]);
        assert_eq!(game.host().as_deref(), Some(anchor.id()));
        assert_eq!(engine.players().len(), 1);
    }
}
