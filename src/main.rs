// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use holomush_dispatch::{
    alias::AliasCache,
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    dispatch::Dispatcher,
    errors::player_message,
    ids::{CharacterId, PlayerId, SessionId},
    memory::{InMemoryAuthorizer, InMemoryBroadcaster, InMemoryEventStore, InMemorySessionService},
    ratelimit::RateLimiter,
    registry::{CommandEntry, Registry},
    services::{Broadcaster, ExecutionContext, Services},
    telemetry::Telemetry,
};
use tracing::info;

/// Minimal demo commands. A real deployment registers handlers owned by
/// whatever actually implements movement, chat, and administration.
fn register_demo_commands(registry: &Registry) -> Result<()> {
    registry.register(CommandEntry::new(
        "look",
        "core",
        vec![],
        "look",
        "Describe your surroundings.",
        |ctx: &mut ExecutionContext| {
            let stream = ctx.character.to_string();
            let writer = ctx.writer.clone();
            async move {
                writer
                    .emit(&stream, "You see nothing remarkable.")
                    .await
                    .map_err(|cause| holomush_dispatch::errors::DispatchError::WorldError {
                        message: "could not render the room".to_string(),
                        cause: Some(cause),
                    })
            }
        },
    ))?;

    registry.register(CommandEntry::new(
        "say",
        "core",
        vec![],
        "say <message>",
        "Speak to everyone in the room.",
        |ctx: &mut ExecutionContext| {
            let stream = ctx.character.to_string();
            let writer = ctx.writer.clone();
            let message = ctx.args.clone();
            async move {
                writer.emit(&stream, &format!("You say, \"{message}\"")).await.map_err(|cause| {
                    holomush_dispatch::errors::DispatchError::WorldError {
                        message: "could not deliver speech".to_string(),
                        cause: Some(cause),
                    }
                })
            }
        },
    ))?;

    registry.register(CommandEntry::new(
        "pose",
        "core",
        vec![],
        "pose <action>",
        "Emote an action to the room.",
        |ctx: &mut ExecutionContext| {
            let stream = ctx.character.to_string();
            let writer = ctx.writer.clone();
            let action = ctx.args.clone();
            async move {
                writer.emit(&stream, &action).await.map_err(|cause| {
                    holomush_dispatch::errors::DispatchError::WorldError {
                        message: "could not deliver pose".to_string(),
                        cause: Some(cause),
                    }
                })
            }
        },
    ))?;

    registry.register(CommandEntry::new(
        "help",
        "core",
        vec![],
        "help",
        "List available commands.",
        |ctx: &mut ExecutionContext| {
            let stream = ctx.character.to_string();
            let writer = ctx.writer.clone();
            async move {
                writer
                    .emit(&stream, "Commands: look, say, pose, help, admin")
                    .await
                    .map_err(|cause| holomush_dispatch::errors::DispatchError::WorldError {
                        message: "could not list commands".to_string(),
                        cause: Some(cause),
                    })
            }
        },
    ))?;

    registry.register(CommandEntry::new(
        "admin",
        "core",
        vec!["admin.manage".to_string()],
        "admin shutdown",
        "Administrative control, currently only 'shutdown'.",
        |ctx: &mut ExecutionContext| {
            let args = ctx.args.clone();
            async move {
                if args.trim() == "shutdown" {
                    Err(holomush_dispatch::errors::DispatchError::ShutdownRequested)
                } else {
                    Err(holomush_dispatch::errors::DispatchError::InvalidArgs {
                        command: "admin".to_string(),
                        usage: Some("admin shutdown".to_string()),
                    })
                }
            }
        },
    ))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path("demos/config.demo.yaml")
        .or_else(|_| resolve_config_path("config.yaml"));
    let cfg = match config_path.and_then(Config::load_from_file) {
        Ok(cfg) => cfg,
        Err(_) => Config {
            rate_limit: Default::default(),
            telemetry: Default::default(),
        },
    };

    let _logger_guard = init_logger(&cfg.telemetry)?;

    let registry = Arc::new(Registry::new());
    register_demo_commands(&registry).context("failed to register demo commands")?;

    let aliases = Arc::new(AliasCache::new());
    aliases.set_system("l", "look").expect("valid alias");
    aliases.set_system(";", "pose").expect("valid alias");

    let rate_limiter = RateLimiter::spawn(cfg.rate_limit.to_rate_limit_config());

    let authorizer = Arc::new(InMemoryAuthorizer::new());
    let sessions = Arc::new(InMemorySessionService::new());
    let events = Arc::new(InMemoryEventStore::new());
    let broadcaster: Arc<dyn Broadcaster> = Arc::new(InMemoryBroadcaster::new(events.clone()));
    let services = Arc::new(Services::new(authorizer.clone(), sessions, events, broadcaster.clone()));

    let telemetry = Arc::new(Telemetry::new().context("failed to initialize telemetry")?);

    let dispatcher = Dispatcher::new(registry, authorizer.clone(), telemetry)
        .with_aliases(aliases)
        .with_rate_limiter(rate_limiter.clone());

    let character = CharacterId::new();
    let player = PlayerId::new();
    let session = SessionId::new();
    authorizer.grant(format!("char:{character}"), "admin.manage");

    info!(%character, %player, %session, "demo session ready, type commands on stdin");

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        print!("> ");
        std::io::stdout().flush().ok();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let raw = line.trim_end_matches(['\n', '\r']);
        if raw.is_empty() {
            continue;
        }

        let ctx = ExecutionContext {
            character,
            location: None,
            character_name: None,
            player,
            session,
            args: String::new(),
            invoked_as: String::new(),
            writer: broadcaster.clone(),
            services: services.clone(),
        };

        if let Err(err) = dispatcher.dispatch(ctx, raw).await {
            if matches!(err, holomush_dispatch::errors::DispatchError::ShutdownRequested) {
                println!("Shutting down.");
                break;
            }
            println!("{}", player_message(&err));
        }
    }

    rate_limiter.close().await;
    Ok(())
}
