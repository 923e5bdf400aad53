use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "indo")]
#[command(about = "Track tasks and time, online or off")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the offline queue database location
    #[arg(long, global = true, value_name = "PATH")]
    pub queue_path: Option<PathBuf>,

    /// Skip the network and queue every write
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start, stop and log timer sessions
    Timer {
        #[command(subcommand)]
        command: TimerCommands,
    },
    /// Create and update tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Inspect writes waiting for the backend
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Replay queued writes and refresh from the backend
    Sync,
    /// Keep syncing in the foreground until interrupted (polling only)
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TimerCommands {
    /// Start a session for a project (and optional task)
    Start {
        /// Project ID
        #[arg(long, value_name = "ID")]
        project: String,
        /// Task ID
        #[arg(long, value_name = "ID")]
        task: Option<String>,
    },
    /// Stop a running session
    Stop {
        /// Time entry ID
        id: String,
    },
    /// Pause a running session; resume starts a new one
    Pause {
        /// Time entry ID
        id: String,
    },
    /// Start a fresh session for a previously paused project/task
    Resume {
        /// Project ID (defaults to the last pause in this process)
        #[arg(long, value_name = "ID")]
        project: Option<String>,
        /// Task ID
        #[arg(long, value_name = "ID", requires = "project")]
        task: Option<String>,
    },
    /// Record a finished session after the fact
    Log {
        /// Project ID
        #[arg(long, value_name = "ID")]
        project: String,
        /// Task ID
        #[arg(long, value_name = "ID")]
        task: Option<String>,
        /// Start time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        start: String,
        /// End time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        end: String,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change the project, task or notes of a stopped session
    Edit {
        /// Time entry ID
        id: String,
        /// Project ID
        #[arg(long, value_name = "ID")]
        project: String,
        /// Task ID (cleared when omitted)
        #[arg(long, value_name = "ID")]
        task: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a stopped session
    Delete {
        /// Time entry ID
        id: String,
    },
    /// Total time tracked today (UTC), including running sessions
    Today {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show running sessions
    Running {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    #[command(alias = "new")]
    Add {
        /// Task title
        title: Vec<String>,
        /// Priority (p1-p4)
        #[arg(short, long, default_value = "p3")]
        priority: String,
        /// Project ID
        #[arg(long, value_name = "ID")]
        project: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
    },
    /// Flip a task between done and todo
    Toggle {
        /// Task ID
        id: String,
    },
    /// Set a task's status
    Status {
        /// Task ID
        id: String,
        /// New status (todo, in_progress, done)
        status: String,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
    /// List tasks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show pending writes in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the number of pending writes
    Count,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
