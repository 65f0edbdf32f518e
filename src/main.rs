mod activities;
mod backend;
mod badges;
mod config;
mod date;
mod engine;
mod error;
mod merge;
mod model;
mod output;
mod phase;
mod progress;
mod queue;
mod reconciler;
mod session;
mod storage;
mod streak;
mod timers;
mod ts;
mod xp;

use crate::activities::{
    add_custom_task, complete_custom_task, complete_juz, memorize_name, record_khatam, JUZ_COUNT,
    NAMES_COUNT,
};
use crate::backend::HttpBackend;
use crate::badges::BADGES;
use crate::config::{load_config, resolve_config_path, TrackerConfig};
use crate::date::{parse_date, system_now_unix_ms};
use crate::engine::UpdateOutcome;
use crate::error::CliError;
use crate::merge::SessionIdentity;
use crate::model::{CustomTask, DayProgress};
use crate::output::{
    print_json, print_line, render_progress_bar, render_simple_table, resolve_color_enabled,
    Styler,
};
use crate::phase::{DayPosition, Phase, PhaseCalendar, RAMADAN_DAYS};
use crate::progress::{get_or_default, parse_assignment, DaySlot, FieldUpdate, FieldValue, ProgressField};
use crate::reconciler::{PushOutcome, Reconciler, SyncStatus};
use crate::session::Session;
use crate::storage::{resolve_state_dir, FileStore};
use crate::ts::{format_unix_ms, parse_instant_ms};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

type CliSession = Session<HttpBackend, FileStore>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ramadan", version, about = "Ramadan habit tracker")]
struct Cli {
    /// Directory holding the local state and the offline sync queue.
    #[arg(long, global = true)]
    state_dir: Option<String>,

    /// Overrides "now" (RFC3339, or YYYY-MM-DD for local midnight at UTC+5).
    #[arg(long, global = true, env = "RAMADAN_NOW")]
    now: Option<String>,

    /// Tracker config JSON (calendar, XP weights, badge thresholds, sync timings).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Backend base URL. Without it the tracker is local-only.
    #[arg(long, global = true, env = "RAMADAN_BACKEND_URL")]
    backend: Option<String>,

    #[arg(long, global = true, env = "RAMADAN_USER_ID")]
    user_id: Option<i64>,

    /// Display name of the session user.
    #[arg(long = "name", global = true, env = "RAMADAN_USER_NAME")]
    user_name: Option<String>,

    #[arg(long, global = true, env = "RAMADAN_USERNAME")]
    username: Option<String>,

    /// Treat the client as offline: pushes go to the sync queue.
    #[arg(long, global = true, env = "RAMADAN_OFFLINE")]
    offline: bool,

    #[arg(long, global = true, value_enum, default_value = "table")]
    format: Format,

    /// Disables ANSI color output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Phase and day number for now (or --date).
    Day(DayArgs),
    /// Update checklist fields: `ramadan mark fasting fajr=false quran_pages=4`.
    Mark(MarkArgs),
    /// Checklist for one day.
    Show(SlotArgs),
    Status,
    Badges,
    /// Mark a juz (1..=30) as completed.
    Juz(NumberArgs),
    /// Mark one of the 99 Names as memorized.
    Name(NumberArgs),
    /// Record a full Quran completion.
    Khatam,
    Task(TaskArgs),
    /// Replay the offline queue and push the current state.
    Sync,
    /// Ask the backend whether this user has access.
    Access,
    /// List pending offline syncs.
    Queue,
    /// Keep the session running, firing pushes, autosaves and day changes on
    /// their timers.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct DayArgs {
    #[arg(long)]
    date: Option<String>,
}

#[derive(Args, Debug, Default)]
struct SlotArgs {
    /// Calendar date; its phase decides which day record is used.
    #[arg(long, conflicts_with_all = ["ramadan_day", "prep_day"])]
    date: Option<String>,

    /// Ramadan day number (1..=30)
    #[arg(long, conflicts_with = "prep_day")]
    ramadan_day: Option<u32>,

    /// Preparation day number
    #[arg(long)]
    prep_day: Option<u32>,
}

#[derive(Args, Debug)]
struct MarkArgs {
    /// `field`, `field=true|false` or `field=<number>`
    #[arg(required = true)]
    assignments: Vec<String>,

    #[command(flatten)]
    slot: SlotArgs,
}

#[derive(Args, Debug)]
struct NumberArgs {
    number: u32,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Stop after this many seconds; runs until interrupted otherwise.
    #[arg(long)]
    seconds: Option<u64>,

    /// How often the timers are checked.
    #[arg(long, default_value_t = 1_000)]
    interval_ms: u64,
}

#[derive(Args, Debug)]
struct TaskArgs {
    #[command(subcommand)]
    command: TaskCommand,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Add { title: String },
    Done { id: String },
    List,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            let code = if e.use_stderr() { 2 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let exit = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code
        }
    };

    std::process::exit(exit);
}

fn resolve_now(cli_now: Option<&str>) -> Result<i64, CliError> {
    match cli_now.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_instant_ms(s, "now"),
        None => Ok(system_now_unix_ms()),
    }
}

fn resolve_identity(cli: &Cli, config: &TrackerConfig) -> SessionIdentity {
    SessionIdentity {
        user_id: cli.user_id.unwrap_or(0),
        name: cli.user_name.clone().unwrap_or_default(),
        username: cli.username.clone().filter(|u| !u.is_empty()),
        photo_url: None,
        language: config.language.clone(),
    }
}

fn build_backend(cli: &Cli, config: &TrackerConfig) -> Result<Option<HttpBackend>, CliError> {
    let url = cli
        .backend
        .clone()
        .or_else(|| config.sync.backend_url.clone())
        .filter(|u| !u.trim().is_empty());
    let url = match url {
        Some(u) => u,
        None => return Ok(None),
    };
    if cli.user_id.is_none() {
        log::warn!("backend configured without --user-id; running local-only");
        return Ok(None);
    }
    let timeout = Duration::from_secs(config.sync.timeout_secs);
    HttpBackend::new(&url, timeout)
        .map(Some)
        .map_err(|e| CliError::usage(format!("Invalid backend: {}", e)))
}

fn require_backend(session: &CliSession, what: &str) -> Result<(), CliError> {
    if session.reconciler().has_backend() {
        return Ok(());
    }
    Err(CliError::usage(format!(
        "`ramadan {}` requires --backend and --user-id",
        what
    )))
}

/// The day named on the command line, if any.
fn explicit_slot(args: &SlotArgs, calendar: &PhaseCalendar) -> Result<Option<DaySlot>, CliError> {
    if let Some(n) = args.ramadan_day {
        if n < 1 || n as i64 > RAMADAN_DAYS {
            return Err(CliError::usage(format!("Invalid ramadan day: {}", n)));
        }
        return Ok(Some(DaySlot::Ramadan(n)));
    }
    if let Some(n) = args.prep_day {
        if n < 1 || n as i64 > calendar.preparation_days() {
            return Err(CliError::usage(format!("Invalid preparation day: {}", n)));
        }
        return Ok(Some(DaySlot::Preparation(n)));
    }
    match args.date.as_deref() {
        Some(d) => Ok(Some(calendar.classify(parse_date(d, "date")?).slot())),
        None => Ok(None),
    }
}

fn resolve_slot(args: &SlotArgs, session: &CliSession) -> Result<DaySlot, CliError> {
    let slot = explicit_slot(args, session.calendar())?;
    Ok(slot.unwrap_or_else(|| session.position().slot()))
}

fn slot_label(slot: &DaySlot, calendar: &PhaseCalendar) -> String {
    match slot {
        DaySlot::Ramadan(n) => format!("Ramadan day {} ({})", n, calendar.implied_date(slot)),
        DaySlot::Preparation(n) => format!("Preparation day {} ({})", n, calendar.implied_date(slot)),
        DaySlot::Basic(date) => date.clone(),
    }
}

fn position_label(position: &DayPosition, calendar: &PhaseCalendar) -> String {
    match position.phase {
        Phase::Basic => position.date.to_string(),
        _ => slot_label(&position.slot(), calendar),
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotOut {
    phase: Phase,
    key: String,
    date: String,
}

impl SlotOut {
    fn new(slot: &DaySlot, calendar: &PhaseCalendar) -> Self {
        Self {
            phase: slot.phase(),
            key: slot.key(),
            date: calendar.implied_date(slot),
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncOut {
    status: SyncStatus,
    pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    xp_added: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    streak_multiplier: Option<f64>,
}

fn sync_out(session: &CliSession) -> SyncOut {
    let r = session.reconciler();
    let award = r.last_award();
    SyncOut {
        status: r.status(),
        pending: r.queue().len(),
        error: r.last_error().map(str::to_string),
        xp_added: award.and_then(|a| a.xp_added),
        streak_multiplier: award.and_then(|a| a.streak_multiplier),
    }
}

fn print_server_award(sync: &SyncOut, styler: &Styler) {
    if let Some(xp) = sync.xp_added {
        print_line(&styler.green(&format!("server added {:+} XP", xp)));
    }
    if let Some(m) = sync.streak_multiplier {
        print_line(&format!("streak multiplier x{}", m));
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateOut<T: serde::Serialize> {
    #[serde(flatten)]
    result: T,
    xp: u64,
    xp_delta: i64,
    current_streak: u32,
    longest_streak: u32,
    newly_unlocked: Vec<String>,
    sync: SyncOut,
}

fn update_out<T: serde::Serialize>(result: T, outcome: &UpdateOutcome, session: &CliSession) -> UpdateOut<T> {
    UpdateOut {
        result,
        xp: outcome.state.xp,
        xp_delta: outcome.xp_delta,
        current_streak: outcome.state.current_streak,
        longest_streak: outcome.state.longest_streak,
        newly_unlocked: outcome.newly_unlocked.clone().unwrap_or_default(),
        sync: sync_out(session),
    }
}

fn print_update_summary(outcome: &UpdateOutcome, styler: &Styler) {
    let s = &outcome.state;
    let delta = if outcome.xp_delta == 0 {
        String::new()
    } else {
        format!("{:+} XP, ", outcome.xp_delta)
    };
    print_line(&format!(
        "{}total {} XP, streak {} (best {})",
        delta, s.xp, s.current_streak, s.longest_streak
    ));
    for id in outcome.newly_unlocked.iter().flatten() {
        let title = crate::badges::find_badge(id).map(|b| b.title).unwrap_or(id.as_str());
        print_line(&styler.yellow(&format!("New badge: {}", title)));
    }
}

fn field_cell(field: ProgressField, day: &DayProgress, styler: &Styler) -> String {
    match field.get(day) {
        FieldValue::Flag(on) => styler.check(on),
        FieldValue::Count(n) => n.to_string(),
    }
}

fn field_text(field: ProgressField, day: &DayProgress) -> String {
    match field.get(day) {
        FieldValue::Flag(on) => on.to_string(),
        FieldValue::Count(n) => n.to_string(),
    }
}

fn print_day(position: &DayPosition, calendar: &PhaseCalendar, format: Format) -> Result<(), CliError> {
    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Out {
        phase: Phase,
        day_index: i64,
        date: String,
        preparation_start: String,
        ramadan_start: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        days_until_ramadan: Option<i32>,
    }

    let until = position.date.days_until(&calendar.ramadan_start);
    let out = Out {
        phase: position.phase,
        day_index: position.day_index,
        date: position.date.to_string(),
        preparation_start: calendar.preparation_start.to_string(),
        ramadan_start: calendar.ramadan_start.to_string(),
        days_until_ramadan: if until > 0 { Some(until) } else { None },
    };

    if format == Format::Json {
        return print_json(&out);
    }
    match position.phase {
        Phase::Ramadan => print_line(&format!("{}: Ramadan day {} of {}", out.date, out.day_index, RAMADAN_DAYS)),
        Phase::Preparation => print_line(&format!(
            "{}: preparation day {} of {} ({} days until Ramadan)",
            out.date,
            out.day_index,
            calendar.preparation_days(),
            until
        )),
        Phase::Basic => print_line(&format!("{}: {} days until Ramadan", out.date, until)),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let now = resolve_now(cli.now.as_deref())?;
    let config = load_config(resolve_config_path(cli.config.as_deref()).as_deref())?;
    let styler = Styler::new(resolve_color_enabled(cli.no_color));

    if let Command::Day(args) = &cli.command {
        let calendar = PhaseCalendar::from_config(&config.calendar);
        let position = match args.date.as_deref() {
            Some(d) => calendar.classify(parse_date(d, "date")?),
            None => calendar.classify_instant(now),
        };
        return print_day(&position, &calendar, cli.format);
    }

    let store = FileStore::new(resolve_state_dir(cli.state_dir.as_deref())?);
    let backend = build_backend(&cli, &config)?;
    let identity = resolve_identity(&cli, &config);
    let reconciler = Reconciler::new(backend, store, &config.sync, false)?;
    let mut session = Session::start(identity, config, reconciler, now)?;

    if !cli.offline {
        session.connect(now)?;
    }

    let result = run_command(&cli, &mut session, now, &styler);
    session.teardown();
    result
}

fn run_command(cli: &Cli, session: &mut CliSession, now: i64, styler: &Styler) -> Result<(), CliError> {
    match &cli.command {
        Command::Day(_) => Ok(()),

        Command::Mark(args) => {
            let updates = args
                .assignments
                .iter()
                .map(|a| parse_assignment(a))
                .collect::<Result<Vec<FieldUpdate>, _>>()?;
            let (slot, outcome) = match explicit_slot(&args.slot, session.calendar())? {
                Some(slot) => {
                    let outcome = session.record_progress(&slot, &updates, now)?;
                    (slot, outcome)
                }
                None => {
                    let outcome = session.mark_today(&updates, now)?;
                    (session.position().slot(), outcome)
                }
            };
            session.flush(now)?;

            let day = get_or_default(session.state(), session.calendar(), &slot);
            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    day: SlotOut,
                    progress: DayProgress,
                }
                let out = Out {
                    day: SlotOut::new(&slot, session.calendar()),
                    progress: day,
                };
                print_json(&update_out(out, &outcome, session))
            } else {
                let changed: Vec<String> = updates
                    .iter()
                    .map(|u| format!("{}={}", u.field.name(), field_text(u.field, &day)))
                    .collect();
                print_line(&format!("{}: {}", slot_label(&slot, session.calendar()), changed.join(" ")));
                print_update_summary(&outcome, styler);
                Ok(())
            }
        }

        Command::Show(args) => {
            let slot = resolve_slot(args, session)?;
            let day = get_or_default(session.state(), session.calendar(), &slot);
            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    day: SlotOut,
                    progress: DayProgress,
                }
                return print_json(&Out {
                    day: SlotOut::new(&slot, session.calendar()),
                    progress: day,
                });
            }

            let rows: Vec<Vec<String>> = ProgressField::ALL
                .iter()
                .map(|f| vec![f.name().to_string(), field_cell(*f, &day, styler)])
                .collect();
            print_line(&slot_label(&slot, session.calendar()));
            print_line("");
            print_line(&render_simple_table(&["field", "value"], &rows));
            Ok(())
        }

        Command::Status => {
            let state = session.state();
            let position = session.position();
            let open_tasks = state.custom_tasks.iter().filter(|t| !t.completed).count();

            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                #[serde(rename_all = "camelCase")]
                struct Out {
                    today: DayPosition,
                    xp: u64,
                    current_streak: u32,
                    longest_streak: u32,
                    last_active_date: String,
                    unlocked_badges: Vec<String>,
                    completed_juzs: usize,
                    memorized_names: usize,
                    quran_khatams: u32,
                    open_tasks: usize,
                    online: bool,
                    sync: SyncOut,
                }
                return print_json(&Out {
                    today: *position,
                    xp: state.xp,
                    current_streak: state.current_streak,
                    longest_streak: state.longest_streak,
                    last_active_date: state.last_active_date.clone(),
                    unlocked_badges: state.unlocked_badges.clone(),
                    completed_juzs: state.completed_juzs.len(),
                    memorized_names: state.memorized_names.len(),
                    quran_khatams: state.quran_khatams,
                    open_tasks,
                    online: session.reconciler().is_online(),
                    sync: sync_out(session),
                });
            }

            let today = position_label(position, session.calendar());
            let rows = vec![
                vec!["today".to_string(), today],
                vec!["xp".to_string(), state.xp.to_string()],
                vec![
                    "streak".to_string(),
                    format!("{} (best {})", state.current_streak, state.longest_streak),
                ],
                vec![
                    "badges".to_string(),
                    format!("{}/{}", state.unlocked_badges.len(), BADGES.len()),
                ],
                vec![
                    "juz".to_string(),
                    format!(
                        "{} {}/{}",
                        render_progress_bar(state.completed_juzs.len(), JUZ_COUNT as usize, 10),
                        state.completed_juzs.len(),
                        JUZ_COUNT
                    ),
                ],
                vec![
                    "names".to_string(),
                    format!("{}/{}", state.memorized_names.len(), NAMES_COUNT),
                ],
                vec!["khatams".to_string(), state.quran_khatams.to_string()],
                vec!["open tasks".to_string(), open_tasks.to_string()],
                vec![
                    "sync".to_string(),
                    format!(
                        "{} ({} pending)",
                        session.status().as_str(),
                        session.reconciler().queue().len()
                    ),
                ],
            ];
            print_line(&render_simple_table(&["metric", "value"], &rows));
            Ok(())
        }

        Command::Badges => {
            let state = session.state();
            let thresholds = &session.config().badges;

            #[derive(serde::Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Row {
                id: &'static str,
                title: &'static str,
                value: u64,
                threshold: u64,
                unlocked: bool,
            }
            let rows: Vec<Row> = BADGES
                .iter()
                .map(|b| Row {
                    id: b.id,
                    title: b.title,
                    value: b.metric.value(state),
                    threshold: b.metric.threshold(thresholds),
                    unlocked: state.has_badge(b.id),
                })
                .collect();

            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    badges: Vec<Row>,
                }
                return print_json(&Out { badges: rows });
            }

            let table: Vec<Vec<String>> = rows
                .iter()
                .map(|r| {
                    vec![
                        r.id.to_string(),
                        r.title.to_string(),
                        format!("{}/{}", r.value.min(r.threshold), r.threshold),
                        if r.unlocked {
                            styler.green("yes")
                        } else {
                            styler.gray("no")
                        },
                    ]
                })
                .collect();
            print_line(&render_simple_table(&["id", "title", "progress", "unlocked"], &table));
            Ok(())
        }

        Command::Juz(args) => {
            let n = args.number;
            let outcome = session.activity(now, |s| complete_juz(s, n))?;
            session.flush(now)?;
            let juzs = outcome.state.completed_juzs.clone();
            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                #[serde(rename_all = "camelCase")]
                struct Out {
                    completed_juzs: Vec<u32>,
                }
                return print_json(&update_out(Out { completed_juzs: juzs }, &outcome, session));
            }
            print_line(&format!(
                "Juz {} done  {} {}/{}",
                n,
                render_progress_bar(juzs.len(), JUZ_COUNT as usize, 10),
                juzs.len(),
                JUZ_COUNT
            ));
            print_update_summary(&outcome, styler);
            Ok(())
        }

        Command::Name(args) => {
            let n = args.number;
            let outcome = session.activity(now, |s| memorize_name(s, n))?;
            session.flush(now)?;
            let names = outcome.state.memorized_names.clone();
            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                #[serde(rename_all = "camelCase")]
                struct Out {
                    memorized_names: Vec<u32>,
                }
                return print_json(&update_out(Out { memorized_names: names }, &outcome, session));
            }
            print_line(&format!("Name {} memorized ({}/{})", n, names.len(), NAMES_COUNT));
            print_update_summary(&outcome, styler);
            Ok(())
        }

        Command::Khatam => {
            let outcome = session.activity(now, |s| Ok(record_khatam(s)))?;
            session.flush(now)?;
            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                #[serde(rename_all = "camelCase")]
                struct Out {
                    quran_khatams: u32,
                }
                let out = Out {
                    quran_khatams: outcome.state.quran_khatams,
                };
                return print_json(&update_out(out, &outcome, session));
            }
            print_line(&format!("Khatam #{} recorded", outcome.state.quran_khatams));
            print_update_summary(&outcome, styler);
            Ok(())
        }

        Command::Task(args) => run_task(&args.command, cli.format, session, now, styler),

        Command::Sync => {
            require_backend(session, "sync")?;
            let (report, pushed) = session.sync_now(now)?;

            #[derive(serde::Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Out {
                replayed: usize,
                rejected: usize,
                remaining: usize,
                push: &'static str,
                sync: SyncOut,
            }
            let push = match pushed {
                PushOutcome::Synced(_) => "synced",
                PushOutcome::Queued => "queued",
                PushOutcome::Rejected(_) => "rejected",
                PushOutcome::LocalOnly => "local",
            };
            let out = Out {
                replayed: report.replayed,
                rejected: report.rejected,
                remaining: report.remaining,
                push,
                sync: sync_out(session),
            };
            if cli.format == Format::Json {
                return print_json(&out);
            }
            print_line(&format!(
                "replayed {} ({} rejected), {} still queued, push {}, status {}",
                out.replayed,
                out.rejected,
                out.remaining,
                out.push,
                out.sync.status.as_str()
            ));
            print_server_award(&out.sync, styler);
            if let Some(e) = out.sync.error.as_deref() {
                print_line(&styler.gray(e));
            }
            Ok(())
        }

        Command::Access => {
            require_backend(session, "access")?;
            let access = session.check_access();

            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    access: Option<crate::backend::AccessStatus>,
                    sync: SyncOut,
                }
                return print_json(&Out {
                    access,
                    sync: sync_out(session),
                });
            }
            match access {
                Some(a) => {
                    let mut line = format!(
                        "access: {} ({})",
                        if a.has_access { "yes" } else { "no" },
                        a.payment_status.as_str()
                    );
                    if let Some(exp) = a.demo_expires.as_deref() {
                        line.push_str(&format!(", demo until {}", exp));
                    }
                    if let Some(reason) = a.reason.as_deref() {
                        line.push_str(&format!(", {}", reason));
                    }
                    print_line(&line);
                }
                None => print_line(&format!(
                    "access unknown (sync {})",
                    session.status().as_str()
                )),
            }
            Ok(())
        }

        Command::Queue => {
            #[derive(serde::Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Row {
                owner_id: i64,
                enqueued_at: String,
                xp: u64,
            }
            let rows: Vec<Row> = session
                .reconciler()
                .queue()
                .items()
                .iter()
                .map(|i| Row {
                    owner_id: i.owner_id,
                    enqueued_at: format_unix_ms(i.enqueued_at_ms),
                    xp: i.payload.xp,
                })
                .collect();

            if cli.format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    queue: Vec<Row>,
                }
                return print_json(&Out { queue: rows });
            }
            if rows.is_empty() {
                print_line(&styler.gray("(queue is empty)"));
                return Ok(());
            }
            let table: Vec<Vec<String>> = rows
                .iter()
                .map(|r| vec![r.owner_id.to_string(), r.enqueued_at.clone(), r.xp.to_string()])
                .collect();
            print_line(&render_simple_table(&["owner", "enqueued", "xp"], &table));
            Ok(())
        }

        Command::Watch(args) => run_watch(args, cli.format, session, now, styler),
    }
}

/// Drives the session timers on a clock that starts at `start` and advances
/// one interval per sleep.
fn run_watch(
    args: &WatchArgs,
    format: Format,
    session: &mut CliSession,
    start: i64,
    styler: &Styler,
) -> Result<(), CliError> {
    let interval = args.interval_ms.max(1);
    let limit = args.seconds.map(|s| s.saturating_mul(1_000) / interval);

    let mut ticks = 0u64;
    let mut pushes = 0u64;
    let mut day_changes: Vec<DayPosition> = Vec::new();
    while limit.map_or(true, |n| ticks < n) {
        std::thread::sleep(Duration::from_millis(interval));
        ticks += 1;
        let now = start.saturating_add((ticks * interval) as i64);
        let before = *session.position();

        let fired = session.tick(now)?;
        if fired.iter().any(|k| k.pushes()) {
            pushes += 1;
            if format == Format::Table {
                print_line(&styler.gray(&format!(
                    "{} push, sync {}",
                    format_unix_ms(now),
                    session.status().as_str()
                )));
            }
        }
        let position = *session.position();
        if position != before {
            if format == Format::Table {
                print_line(&format!("day changed: {}", position_label(&position, session.calendar())));
            }
            day_changes.push(position);
        }
    }

    if format == Format::Json {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Out {
            ticks: u64,
            pushes: u64,
            day_changes: Vec<DayPosition>,
            today: DayPosition,
            sync: SyncOut,
        }
        return print_json(&Out {
            ticks,
            pushes,
            day_changes,
            today: *session.position(),
            sync: sync_out(session),
        });
    }
    print_line(&format!(
        "watched {} tick(s), {} push(es), sync {}",
        ticks,
        pushes,
        session.status().as_str()
    ));
    Ok(())
}

fn run_task(
    command: &TaskCommand,
    format: Format,
    session: &mut CliSession,
    now: i64,
    styler: &Styler,
) -> Result<(), CliError> {
    match command {
        TaskCommand::Add { title } => {
            let mut created: Option<CustomTask> = None;
            let outcome = session.activity(now, |s| {
                let (next, task) = add_custom_task(s, title)?;
                created = Some(task);
                Ok(next)
            })?;
            session.flush(now)?;
            let task = created.ok_or_else(|| CliError::io("Task was not created"))?;

            if format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    task: CustomTask,
                }
                return print_json(&update_out(Out { task }, &outcome, session));
            }
            print_line(&render_simple_table(
                &["id", "title"],
                &[vec![task.id.clone(), task.title.clone()]],
            ));
            Ok(())
        }

        TaskCommand::Done { id } => {
            let outcome = session.activity(now, |s| complete_custom_task(s, id))?;
            session.flush(now)?;
            if format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    id: String,
                }
                return print_json(&update_out(Out { id: id.clone() }, &outcome, session));
            }
            print_line(&format!("{} done", id));
            print_update_summary(&outcome, styler);
            Ok(())
        }

        TaskCommand::List => {
            let tasks = session.state().custom_tasks.clone();
            if format == Format::Json {
                #[derive(serde::Serialize)]
                struct Out {
                    tasks: Vec<CustomTask>,
                }
                return print_json(&Out { tasks });
            }
            let rows: Vec<Vec<String>> = tasks
                .iter()
                .map(|t| vec![t.id.clone(), t.title.clone(), styler.check(t.completed)])
                .collect();
            print_line(&render_simple_table(&["id", "title", "done"], &rows));
            Ok(())
        }
    }
}
