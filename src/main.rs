use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use goalstack::cli::{goal_line, journal_line, render_tree, sprint_line, workspace_line};
use goalstack::config::Config;
use goalstack::db::{Database, EncryptionState, SearchQuery};
use goalstack::models::{
    CreateGoalInput, CreateJournalEntryInput, CreateWorkspaceInput, GoalStatus, Workspace,
};
use goalstack::recurrence::RecurrenceRule;
use goalstack::vault::{self, ExportOptions};

#[derive(Parser)]
#[command(name = "goalstack")]
#[command(about = "Goals, sprints and a daily journal in a local SQLite store")]
#[command(version)]
struct Cli {
    /// Store file (overrides GOALSTACK_DB and the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Passphrase for an encrypted store (overrides GOALSTACK_PASSPHRASE)
    #[arg(long, global = true)]
    passphrase: Option<String>,

    /// Workspace slug to act on
    #[arg(short, long, global = true)]
    workspace: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store location, encryption state and the active sprint
    Status,
    /// Manage workspaces
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Manage goals
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Manage goal dependencies
    #[command(subcommand)]
    Dep(DepCommand),
    /// Manage sprints
    #[command(subcommand)]
    Sprint(SprintCommand),
    /// Manage journal entries
    #[command(subcommand)]
    Journal(JournalCommand),
    /// Write the whole store as a vault document
    Export {
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Seal the vault with this passphrase
        #[arg(long)]
        seal: Option<String>,
        #[arg(long)]
        pretty: bool,
    },
    /// Add the contents of a vault document to the store
    Import {
        input: PathBuf,
        /// Passphrase of a sealed vault
        #[arg(long)]
        seal: Option<String>,
    },
    /// Encrypt the store in place with the given passphrase
    Encrypt { new_passphrase: String },
    /// Change the key of an encrypted store
    Rekey { new_passphrase: String },
    /// Replace an empty store with a fresh encrypted one
    Recreate { new_passphrase: String },
    /// Manage the app lock passphrase
    #[command(subcommand)]
    Passphrase(PassphraseCommand),
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    List,
    Create {
        name: String,
        #[arg(long)]
        slug: Option<String>,
    },
    Rename {
        slug: String,
        name: String,
    },
    /// Make a workspace the default for later commands
    Use {
        slug: String,
    },
}

#[derive(Args)]
struct NewGoal {
    description: String,
    #[arg(long)]
    notes: Option<String>,
    /// 1 (highest) to 5
    #[arg(short, long)]
    priority: Option<i64>,
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    /// e.g. `daily`, `weekly:mon,thu`, `monthly:days=1,15`
    #[arg(short, long)]
    recur: Option<String>,
}

impl NewGoal {
    fn into_input(self) -> CreateGoalInput {
        CreateGoalInput {
            notes: self.notes,
            priority: self.priority,
            tags: self.tags,
            recurrence_rule: self.recur,
            ..CreateGoalInput::new(self.description)
        }
    }
}

#[derive(Subcommand)]
enum GoalCommand {
    Add {
        #[command(flatten)]
        goal: NewGoal,
        /// Sprint to plan the goal into, backlog when omitted
        #[arg(short, long)]
        sprint: Option<Uuid>,
    },
    /// Add a subtask under a goal
    Sub {
        parent: Uuid,
        #[command(flatten)]
        goal: NewGoal,
    },
    /// List backlog, sprint, archived or completed goals
    List {
        #[arg(short, long)]
        sprint: Option<Uuid>,
        #[arg(long, conflicts_with = "sprint")]
        archived: bool,
        /// Goals completed on this date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["sprint", "archived"])]
        completed: Option<NaiveDate>,
    },
    Show {
        id: Uuid,
    },
    Done {
        id: Uuid,
    },
    Reopen {
        id: Uuid,
    },
    Archive {
        id: Uuid,
    },
    Unarchive {
        id: Uuid,
    },
    /// Print goals and subtasks as a tree
    Tree {
        #[arg(short, long)]
        sprint: Option<Uuid>,
    },
    /// Search with terms, `status:<s>` and `#tag`
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Move a goal into a sprint, or back to the backlog
    Move {
        id: Uuid,
        #[arg(short, long)]
        sprint: Option<Uuid>,
    },
    Priority {
        id: Uuid,
        priority: i64,
    },
    Tags {
        id: Uuid,
        tags: Vec<String>,
    },
    /// Set or clear (no rule) the recurrence rule
    Recur {
        id: Uuid,
        rule: Option<String>,
    },
    /// Start the goal's timer
    Start {
        id: Uuid,
    },
    /// Pause the goal's timer
    Pause {
        id: Uuid,
    },
    /// Swap the positions of two goals
    Swap {
        a: Uuid,
        b: Uuid,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum DepCommand {
    /// GOAL waits for ON
    Add { goal: Uuid, on: Uuid },
    Rm { goal: Uuid, on: Uuid },
    /// Replace every dependency of GOAL
    Set { goal: Uuid, on: Vec<Uuid> },
    List { goal: Uuid },
}

#[derive(Subcommand)]
enum SprintCommand {
    /// Create the day's sprints
    Bootstrap {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        count: Option<u8>,
    },
    List {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Start {
        id: Uuid,
    },
    Pause {
        id: Uuid,
    },
    Resume {
        id: Uuid,
    },
    Complete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum JournalCommand {
    Add {
        content: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        sprint: Option<Uuid>,
        #[arg(short, long)]
        goal: Option<Uuid>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    List {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Rm {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum PassphraseCommand {
    Set {
        #[arg(value_name = "PASSPHRASE")]
        secret: String,
    },
    Verify {
        #[arg(value_name = "PASSPHRASE")]
        secret: String,
    },
    Clear,
}

/// Initialize tracing with output to stderr so stdout stays clean for output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "goalstack=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print `items` as JSON or one line each.
fn print_list<T: Serialize>(json: bool, items: &[T], line: fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        return print_json(&items);
    }
    for item in items {
        println!("{}", line(item));
    }
    Ok(())
}

fn resolve_workspace(db: &Database, slug: Option<&str>) -> anyhow::Result<Workspace> {
    match slug {
        Some(slug) => db
            .workspace_by_slug(slug)?
            .with_context(|| format!("No workspace with slug '{}'", slug)),
        None => Ok(db.ensure_default_workspace()?),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load();
    if let Some(path) = cli.db {
        config.db_path = Some(path);
    }
    if let Some(passphrase) = cli.passphrase {
        config.passphrase = Some(passphrase);
    }
    if let Some(slug) = cli.workspace {
        config.workspace = Some(slug);
    }

    let db_path = config.db_path()?;
    let db = Database::open(&db_path, config.passphrase.as_deref())
        .with_context(|| format!("Failed to open {}", db_path.display()))?
        .with_op_timeout(config.op_timeout());

    let json = cli.json;
    let workspace = || resolve_workspace(&db, config.workspace.as_deref());

    match cli.command {
        Commands::Status => {
            let ws = workspace()?;
            let state = match db.encryption_state() {
                EncryptionState::Encrypted => "encrypted",
                EncryptionState::Unencrypted => "unencrypted",
                EncryptionState::UnencryptedUnsupported => "unencrypted (encryption not built in)",
            };
            println!("store:     {}", db_path.display());
            println!("state:     {}", state);
            println!("workspace: {}", workspace_line(&ws));
            match db.active_sprint(ws.id)? {
                Some(sprint) => println!("active:    {}", sprint_line(&sprint)),
                None => println!("active:    none"),
            }
        }

        Commands::Workspace(cmd) => match cmd {
            WorkspaceCommand::List => {
                db.ensure_default_workspace()?;
                print_list(json, &db.list_workspaces()?, workspace_line)?;
            }
            WorkspaceCommand::Create { name, slug } => {
                let ws = db.create_workspace(CreateWorkspaceInput { name, slug })?;
                println!("{}", workspace_line(&ws));
            }
            WorkspaceCommand::Rename { slug, name } => {
                let ws = resolve_workspace(&db, Some(&slug))?;
                println!("{}", workspace_line(&db.rename_workspace(ws.id, &name)?));
            }
            WorkspaceCommand::Use { slug } => {
                let ws = resolve_workspace(&db, Some(&slug))?;
                // Start from the file alone so flags and env never get persisted
                let mut saved = Config::try_load()?;
                saved.workspace = Some(ws.slug.clone());
                saved.save()?;
                println!("{}", workspace_line(&ws));
            }
        },

        Commands::Goal(cmd) => match cmd {
            GoalCommand::Add { goal, sprint } => {
                let mut input = goal.into_input();
                input.sprint_id = sprint;
                if sprint.is_none() {
                    input.workspace_id = Some(workspace()?.id);
                }
                println!("{}", goal_line(&db.add_goal(input)?));
            }
            GoalCommand::Sub { parent, goal } => {
                println!("{}", goal_line(&db.add_subtask(parent, goal.into_input())?));
            }
            GoalCommand::List {
                sprint,
                archived,
                completed,
            } => {
                let goals = match (sprint, archived, completed) {
                    (Some(sprint), _, _) => db.goals_for_sprint(sprint)?,
                    (None, true, _) => db.archived(workspace()?.id)?,
                    (None, false, Some(date)) => db.completed_for_day(workspace()?.id, date)?,
                    (None, false, None) => db.backlog(workspace()?.id)?,
                };
                print_list(json, &goals, goal_line)?;
            }
            GoalCommand::Show { id } => {
                let goal = db.get_goal(id)?;
                if json {
                    print_json(&goal)?;
                } else {
                    println!("{}", goal_line(&goal));
                    if let Some(notes) = &goal.notes {
                        println!("\n{}", notes);
                    }
                    for dep in db.dependencies(id)? {
                        println!("waits for {}", dep);
                    }
                }
            }
            GoalCommand::Done { id } => {
                let goal = db.set_goal_status(id, GoalStatus::Completed)?;
                println!("{}", goal_line(&goal));
            }
            GoalCommand::Reopen { id } => {
                println!("{}", goal_line(&db.set_goal_status(id, GoalStatus::Pending)?));
            }
            GoalCommand::Archive { id } => println!("{}", goal_line(&db.archive_goal(id)?)),
            GoalCommand::Unarchive { id } => println!("{}", goal_line(&db.unarchive_goal(id)?)),
            GoalCommand::Tree { sprint } => {
                let tree = db.goal_tree(workspace()?.id, sprint)?;
                if json {
                    print_json(&tree)?;
                } else {
                    print!("{}", render_tree(&tree));
                }
            }
            GoalCommand::Search { query } => {
                let query = SearchQuery::parse(&query.join(" "));
                anyhow::ensure!(!query.is_empty(), "Nothing to search for");
                print_list(json, &db.search(workspace()?.id, &query)?, goal_line)?;
            }
            GoalCommand::Move { id, sprint } => {
                println!("{}", goal_line(&db.move_goal(id, sprint)?));
            }
            GoalCommand::Priority { id, priority } => {
                println!("{}", goal_line(&db.set_goal_priority(id, priority)?));
            }
            GoalCommand::Tags { id, tags } => {
                println!("{}", goal_line(&db.set_goal_tags(id, tags)?));
            }
            GoalCommand::Recur { id, rule } => {
                let goal = db.set_goal_recurrence(id, rule.as_deref())?;
                println!("{}", goal_line(&goal));
                let next = goal
                    .recurrence_rule
                    .as_deref()
                    .and_then(RecurrenceRule::parse)
                    .and_then(|rule| rule.next_occurrence(Utc::now().date_naive()));
                if let Some(next) = next {
                    println!("next:      {}", next);
                }
            }
            GoalCommand::Start { id } => println!("{}", goal_line(&db.start_goal_timer(id)?)),
            GoalCommand::Pause { id } => println!("{}", goal_line(&db.pause_goal_timer(id)?)),
            GoalCommand::Swap { a, b } => db.swap_ranks(a, b)?,
            GoalCommand::Delete { id } => db.delete_goal(id)?,
        },

        Commands::Dep(cmd) => match cmd {
            DepCommand::Add { goal, on } => db.add_dependency(goal, on)?,
            DepCommand::Rm { goal, on } => db.remove_dependency(goal, on)?,
            DepCommand::Set { goal, on } => {
                let kept = db.set_dependencies(goal, &on)?;
                if kept.len() < on.len() {
                    tracing::warn!(
                        requested = on.len(),
                        kept = kept.len(),
                        "Some dependencies were skipped"
                    );
                }
            }
            DepCommand::List { goal } => {
                let deps: Vec<Uuid> = db.dependencies(goal)?.into_iter().collect();
                if json {
                    print_json(&deps)?;
                } else {
                    for dep in deps {
                        println!("{}", goal_line(&db.get_goal(dep)?));
                    }
                }
            }
        },

        Commands::Sprint(cmd) => match cmd {
            SprintCommand::Bootstrap { date, count } => {
                let count = count.unwrap_or(config.sprints_per_day);
                let sprints =
                    db.bootstrap_sprints(workspace()?.id, date.unwrap_or_else(today), count)?;
                print_list(json, &sprints, sprint_line)?;
            }
            SprintCommand::List { date } => {
                let sprints = db.sprints_for_day(workspace()?.id, date.unwrap_or_else(today))?;
                print_list(json, &sprints, sprint_line)?;
            }
            SprintCommand::Start { id } => println!("{}", sprint_line(&db.start_sprint(id)?)),
            SprintCommand::Pause { id } => println!("{}", sprint_line(&db.pause_sprint(id)?)),
            SprintCommand::Resume { id } => println!("{}", sprint_line(&db.resume_sprint(id)?)),
            SprintCommand::Complete { id } => {
                println!("{}", sprint_line(&db.complete_sprint(id)?));
            }
        },

        Commands::Journal(cmd) => match cmd {
            JournalCommand::Add {
                content,
                date,
                sprint,
                goal,
                tags,
            } => {
                let entry = db.add_journal_entry(CreateJournalEntryInput {
                    workspace_id: workspace()?.id,
                    date: date.unwrap_or_else(today),
                    sprint_id: sprint,
                    goal_id: goal,
                    content,
                    tags,
                })?;
                println!("{}", journal_line(&entry));
            }
            JournalCommand::List { date } => {
                let entries = db.journal_for_day(workspace()?.id, date.unwrap_or_else(today))?;
                print_list(json, &entries, journal_line)?;
            }
            JournalCommand::Rm { id } => db.delete_journal_entry(id)?,
        },

        Commands::Export {
            output,
            seal,
            pretty,
        } => {
            let payload = vault::export_vault(
                &db,
                &ExportOptions {
                    passphrase: seal,
                    pretty,
                },
            )?;
            match output {
                Some(path) => fs::write(&path, payload)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{}", payload),
            }
        }

        Commands::Import { input, seal } => {
            let payload = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let summary = vault::import_vault(&db, &payload, seal.as_deref())?;
            print_json(&summary)?;
        }

        Commands::Encrypt { new_passphrase } => match db.encrypt_database(&new_passphrase) {
            Ok(()) => println!("Encrypted {}", db_path.display()),
            Err(e) if e.is_non_fatal() => {
                tracing::warn!("{}", e);
                db.set_passphrase(&new_passphrase)?;
                println!("Encryption is not built in; set an app passphrase instead");
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Rekey { new_passphrase } => {
            db.rekey_database(&new_passphrase)?;
            println!("Rekeyed {}", db_path.display());
        }
        Commands::Recreate { new_passphrase } => {
            db.recreate_encrypted_database(&new_passphrase)?;
            println!("Recreated {} encrypted", db_path.display());
        }

        Commands::Passphrase(cmd) => match cmd {
            PassphraseCommand::Set { secret } => db.set_passphrase(&secret)?,
            PassphraseCommand::Verify { secret } => {
                if !db.has_passphrase()? {
                    bail!("No passphrase is set");
                }
                if !db.verify_passphrase(&secret)? {
                    bail!("Passphrase does not match");
                }
                println!("ok");
            }
            PassphraseCommand::Clear => {
                if !db.clear_passphrase()? {
                    println!("No passphrase was set");
                }
            }
        },
    }

    Ok(())
}
