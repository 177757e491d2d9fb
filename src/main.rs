use clap::{Parser, Subcommand, ValueEnum};
use deloist::application::bootstrap::workspace_logs_dir;
use deloist::application::commands::{
    clear_token_impl, load_goals_impl, load_today_impl, load_today_with_refresh,
    refresh_statistics_impl, save_token_impl, set_default_task_minutes_impl,
    set_timer_minutes_impl, set_timezone_impl, start_timer_impl, statistics_impl,
    stop_timer_impl, timer_snapshot_impl, update_goal_impl,
};
use deloist::application::goals_store::GoalEdit;
use deloist::domain::statistics::StatsWindow;
use deloist::domain::timer::TimerPhase;
use deloist::infrastructure::logging::init_logging;
use deloist::{AppState, InfraError, TimerNotifier, TimerSnapshot};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "deloist", version, about = "Todoist-backed focus timer")]
struct Cli {
    /// Workspace directory holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the Todoist API token, or remove it with --clear
    Token {
        token: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    /// List tasks due today
    Today,
    /// Show completed-task statistics for a window
    Stats {
        #[arg(long, value_enum, default_value_t = WindowArg::Day)]
        window: WindowArg,
        /// Drop cached labels and completed tasks before fetching
        #[arg(long)]
        refresh: bool,
    },
    /// Show per-label goals
    Goals {
        /// Bypass the cache and refetch label names
        #[arg(long)]
        force: bool,
    },
    /// Create or edit the goal attached to a label id
    SetGoal {
        label_id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        hidden: Option<bool>,
        #[arg(long)]
        completed: Option<bool>,
    },
    /// Run a focus session on a task; Ctrl-C stops and records it
    Focus { task_id: String },
    /// Change default lengths or the timezone
    Config {
        #[arg(long)]
        timer_minutes: Option<u64>,
        #[arg(long)]
        default_task_minutes: Option<u64>,
        /// IANA zone name; an empty value falls back to the system zone
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WindowArg {
    Day,
    Week,
    WorkingWeek,
    Month,
}

impl From<WindowArg> for StatsWindow {
    fn from(value: WindowArg) -> Self {
        match value {
            WindowArg::Day => Self::Day,
            WindowArg::Week => Self::Last7Days,
            WindowArg::WorkingWeek => Self::WorkingWeek,
            WindowArg::Month => Self::Month,
        }
    }
}

struct TerminalNotifier;

impl TimerNotifier for TerminalNotifier {
    fn on_tick(&self, snapshot: &TimerSnapshot) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{} ", snapshot.display);
        let _ = stderr.flush();
    }

    fn on_complete(&self, _snapshot: &TimerSnapshot) {
        eprintln!("\r\x07Session complete");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), InfraError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_focus(state: &AppState, task_id: String) -> Result<(), InfraError> {
    let loaded = load_today_impl(state).await?;
    if !loaded.tasks.iter().any(|task| task.id == task_id) {
        return Err(InfraError::InvalidInput(format!(
            "task {task_id} is not due today"
        )));
    }

    let started = start_timer_impl(state, Some(task_id)).await;
    if started.view.phase != TimerPhase::Running {
        return Err(InfraError::InvalidInput("timer did not start".to_string()));
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                let stopped = stop_timer_impl(state).await;
                if let Some(background) = stopped.background {
                    let _ = background.await;
                }
                return print_json(&stopped.view);
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if timer_snapshot_impl(state).await.phase == TimerPhase::Idle {
                    if let Some(push) = state.timer().take_expiry_push().await {
                        let _ = push.await;
                    }
                    return print_json(&timer_snapshot_impl(state).await);
                }
            }
        }
    }
}

async fn run(state: &AppState, command: Command) -> Result<(), InfraError> {
    match command {
        Command::Token { token: _, clear: true } => clear_token_impl(state),
        Command::Token { token: Some(token), clear: false } => save_token_impl(state, token),
        Command::Token { token: None, clear: false } => Err(InfraError::InvalidInput(
            "pass a token or --clear".to_string(),
        )),
        Command::Today => print_json(&load_today_impl(state).await?),
        Command::Stats { window, refresh } => {
            let window = StatsWindow::from(window);
            let view = if refresh {
                refresh_statistics_impl(state, window).await?
            } else {
                let loaded = load_today_with_refresh(state).await?;
                if let Some(background) = loaded.background {
                    let _ = background.await;
                }
                statistics_impl(state, window)?
            };
            print_json(&view)
        }
        Command::Goals { force } => print_json(&load_goals_impl(state, force).await?),
        Command::SetGoal {
            label_id,
            text,
            image,
            label,
            hidden,
            completed,
        } => {
            let edit = GoalEdit {
                text,
                image,
                label,
                hidden,
                completed,
            };
            print_json(&update_goal_impl(state, label_id, edit).await?)
        }
        Command::Focus { task_id } => run_focus(state, task_id).await,
        Command::Config {
            timer_minutes,
            default_task_minutes,
            timezone,
        } => {
            if let Some(minutes) = timer_minutes {
                set_timer_minutes_impl(state, minutes).await?;
            }
            if let Some(minutes) = default_task_minutes {
                set_default_task_minutes_impl(state, minutes)?;
            }
            if let Some(timezone) = timezone {
                set_timezone_impl(state, Some(timezone))?;
            }
            Ok(())
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Token { .. } => "token",
        Command::Today => "today",
        Command::Stats { .. } => "stats",
        Command::Goals { .. } => "goals",
        Command::SetGoal { .. } => "set_goal",
        Command::Focus { .. } => "focus",
        Command::Config { .. } => "config",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let workspace_root = match cli.root.map(Ok).unwrap_or_else(std::env::current_dir) {
        Ok(root) => root,
        Err(error) => {
            eprintln!("failed to resolve workspace: {error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = init_logging(&workspace_logs_dir(&workspace_root)) {
        eprintln!("{error}");
    }

    let state = match AppState::with_notifier(workspace_root, Arc::new(TerminalNotifier)) {
        Ok(state) => state,
        Err(error) => {
            eprintln!("failed to initialize: {error}");
            return ExitCode::FAILURE;
        }
    };

    let name = command_name(&cli.cmd);
    match run(&state, cli.cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", state.command_error(name, &error));
            ExitCode::FAILURE
        }
    }
}
