//! Command routing
//!
//! Routes parsed CLI arguments to the operator command implementations and
//! returns the process exit code.

use anyhow::Result;

use crate::cli::args::{Cli, Commands};
use crate::commands;
use crate::logview::LogViewOptions;

pub async fn execute_command(cli: Cli) -> Result<i32> {
    let global = cli.global;
    let format = cli.format;

    match cli.command {
        Commands::Run {
            prompt,
            file,
            string,
            iterations,
            model,
            name,
            labels,
            env,
            on_complete,
            timeout,
            iteration_timeout,
            raw,
            grace_period,
            detach,
        } => {
            commands::run::execute(commands::run::RunParams {
                global,
                prompt,
                file,
                string,
                iterations,
                model,
                name,
                labels,
                env,
                on_complete,
                total_timeout: timeout,
                iteration_timeout,
                raw,
                grace_period,
                detach,
            })
            .await
        }
        Commands::List { all } => commands::list::execute(global, all, format).await,
        Commands::Inspect { target } => commands::inspect::execute(global, &target, format).await,
        Commands::Logs {
            target,
            since,
            until,
            grep,
            case_sensitive,
            invert,
            after,
            before,
            context,
            tail,
            follow,
            pretty,
        } => {
            let options = LogViewOptions {
                since,
                until,
                grep,
                case_sensitive,
                invert,
                // -C supplies both sides unless -A/-B override it.
                after: if after > 0 { after } else { context },
                before: if before > 0 { before } else { context },
                tail,
                follow,
                pretty,
            };
            commands::logs::execute(global, &target, options).await
        }
        Commands::Stop { target } => commands::control::stop(global, &target).await,
        Commands::Start { target } => commands::control::start(global, &target).await,
        Commands::Kill { target, immediate } => {
            commands::control::kill(global, &target, immediate).await
        }
        Commands::KillAll {
            labels,
            name,
            force,
            immediate,
        } => {
            commands::bulk::execute(
                global,
                commands::bulk::BulkAction::Kill { immediate },
                labels,
                name,
                force,
            )
            .await
        }
        Commands::PauseAll {
            labels,
            name,
            force,
        } => {
            commands::bulk::execute(global, commands::bulk::BulkAction::Pause, labels, name, force)
                .await
        }
        Commands::ResumeAll {
            labels,
            name,
            force,
        } => {
            commands::bulk::execute(
                global,
                commands::bulk::BulkAction::Resume,
                labels,
                name,
                force,
            )
            .await
        }
        Commands::Update {
            target,
            iterations,
            model,
            name,
            labels,
            remove_labels,
        } => {
            commands::update::execute(commands::update::UpdateParams {
                global,
                target,
                iterations,
                model,
                name,
                labels,
                remove_labels,
            })
            .await
        }
        Commands::Restart {
            target,
            continue_,
            iterations,
            detach,
        } => {
            commands::restart::restart(commands::restart::RestartParams {
                global,
                target,
                continue_,
                iterations,
                detach,
            })
            .await
        }
        Commands::Clone {
            target,
            name,
            model,
            iterations,
            labels,
            dry_run,
            detach,
        } => {
            commands::restart::clone(commands::restart::CloneParams {
                global,
                target,
                name,
                model,
                iterations,
                labels,
                dry_run,
                detach,
            })
            .await
        }
        Commands::Replay {
            target,
            dry_run,
            detach,
        } => commands::restart::replay(global, &target, dry_run, detach).await,
        Commands::Wait {
            targets,
            any,
            timeout,
            interval,
        } => commands::wait::execute(global, targets, any, timeout, interval).await,
        Commands::Prune { older_than, logs } => {
            commands::prune::execute(global, older_than, logs).await
        }
        Commands::Doctor => commands::doctor::execute(global).await,
        Commands::Supervise {
            id,
            env,
            timeout,
            iteration_timeout,
            raw,
            grace_period,
            starting_iteration,
        } => {
            commands::supervise::execute(commands::supervise::SuperviseParams {
                global,
                id,
                env,
                total_timeout: timeout,
                iteration_timeout,
                raw,
                grace_period,
                starting_iteration,
            })
            .await
        }
    }
}
