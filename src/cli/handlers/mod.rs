use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::cli::commands::*;
use crate::cli::output::{self, DragJson, ListJson};
use crate::io::file_store::FileStore;
use crate::io::project_io::{self, Project, ProjectError};
use crate::io::store::OrderStore;
use crate::io::{config_io, recovery};
use crate::model::drag::LayoutRow;
use crate::model::visible::VisibleItem;
use crate::ops::check::check_items;
use crate::ops::flatten::{FlattenOptions, flatten_with};
use crate::ops::session::ListSession;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let start = start_dir(cli.project_dir.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(&start),
        Commands::List(args) => cmd_list(&start, args, json),
        Commands::Add(args) => cmd_add(&start, args),
        Commands::Check(args) => with_session(&start, |s| Ok(s.set_checked(args.id, true)?)),
        Commands::Uncheck(args) => with_session(&start, |s| Ok(s.set_checked(args.id, false)?)),
        Commands::Rm(args) => with_session(&start, |s| Ok(s.remove(args.id)?)),
        Commands::Toggle(args) => with_session(&start, |s| {
            let expanded = s.toggle_expanded(args.id)?;
            println!("{} {}", if expanded { "expanded" } else { "collapsed" }, args.id);
            Ok(())
        }),
        Commands::Edit(args) => with_session(&start, |s| Ok(s.set_text(args.id, &args.text)?)),
        Commands::Mv(args) => with_session(&start, |s| Ok(s.move_sibling(args.id, args.position)?)),
        Commands::Tier(args) => with_session(&start, |s| Ok(s.change_tier(args.id, args.delta)?)),
        Commands::Drag(args) => cmd_drag(&start, args, json),
        Commands::Verify => cmd_verify(&start, json),
        Commands::Config(args) => cmd_config(&start, args, json),
        Commands::Recovery(args) => cmd_recovery(&start, args, json),
    }
}

fn start_dir(override_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match override_dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

fn load_project(start: &Path) -> Result<Project, ProjectError> {
    let root = project_io::discover_project(start)?;
    project_io::load_project(&root)
}

fn open_session(start: &Path) -> Result<ListSession<FileStore>, Box<dyn std::error::Error>> {
    let project = load_project(start)?;
    let store = project.open_store()?;
    Ok(ListSession::new(store, project.config).with_recovery_dir(project.dir))
}

fn with_session<F>(start: &Path, f: F) -> CmdResult
where
    F: FnOnce(&mut ListSession<FileStore>) -> CmdResult,
{
    let mut session = open_session(start)?;
    f(&mut session)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_init(start: &Path) -> CmdResult {
    let project = project_io::init_project(start)?;
    println!("Initialized tiered list in {}", project.dir.display());
    Ok(())
}

fn cmd_list(start: &Path, args: ListArgs, json: bool) -> CmdResult {
    let session = open_session(start)?;
    let forest = session.forest()?;
    let list = flatten_with(
        &forest,
        FlattenOptions {
            excluded_subtree_root: None,
            ignore_collapse: args.all,
        },
    );
    if json {
        let out = ListJson {
            revision: session.store().revision(),
            items: &list,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for line in output::format_list(&list) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_add(start: &Path, args: AddArgs) -> CmdResult {
    let mut session = open_session(start)?;
    let id = session.add(&args.text, args.parent, args.after)?;
    println!("{}", id);
    Ok(())
}

/// Uniform-height layout for every visible row
fn synthetic_layout(list: &[VisibleItem], row_height: f32) -> Vec<LayoutRow> {
    list.iter()
        .map(|v| LayoutRow {
            item_id: v.item.id,
            lazy_list_index: v.lazy_list_index,
            top_offset_px: v.lazy_list_index as f32 * row_height,
            height_px: row_height,
        })
        .collect()
}

fn cmd_drag(start: &Path, args: DragArgs, json: bool) -> CmdResult {
    if !(args.row_height > 0.0) {
        return Err("--row-height must be positive".into());
    }
    let mut session = open_session(start)?;
    let layout = synthetic_layout(&session.visible()?, args.row_height);
    let row = layout
        .iter()
        .find(|r| r.item_id == args.id)
        .copied()
        .ok_or_else(|| format!("item {} is not visible", args.id))?;
    let token = session.begin_drag(args.id, row, args.row_height / 2.0)?;

    let steps = args.steps.max(1);
    let (step_x, step_y) = (args.dx / steps as f32, args.dy / steps as f32);
    for _ in 0..steps {
        let layout = synthetic_layout(&session.visible()?, args.row_height);
        session.drag(token, step_x, step_y, &layout)?;
    }

    let state = session.drag_state();
    let request = if args.dry_run {
        session.preview_drag_end(token)?
    } else {
        session.end_drag(token)?
    };
    let committed = request.is_some() && !args.dry_run;

    if json {
        let out = DragJson::new(args.id, &state, request, committed);
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match &request {
            Some(r) if committed => println!("{}", output::format_request(r)),
            Some(r) => println!("would {}", output::format_request(r)),
            None if state.drag_max_exceeded => println!("no change (tier limit)"),
            None => println!("no change"),
        }
    }
    Ok(())
}

fn cmd_verify(start: &Path, json: bool) -> CmdResult {
    let project = load_project(start)?;
    let store = project.open_store()?;
    let result = check_items(&store.items()?, &project.config.list);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in output::format_check_result(&result) {
            println!("{}", line);
        }
    }
    if !result.valid {
        let entry = recovery::RecoveryEntry::new(
            recovery::RecoveryCategory::Integrity,
            "verify found errors",
        )
        .field("Revision", store.revision())
        .body(serde_json::to_string(&result.errors)?);
        recovery::log_recovery(&project.dir, &entry);
        return Err("integrity check failed".into());
    }
    Ok(())
}

fn cmd_config(start: &Path, args: ConfigArgs, json: bool) -> CmdResult {
    let project = load_project(start)?;
    let (config, mut doc) = config_io::read_config(&project.dir)?;
    let config = match (args.key, args.value) {
        (Some(key), Some(value)) => {
            let updated = config_io::set_key(&mut doc, &key, &value)?;
            config_io::write_config(&project.dir, &doc)?;
            updated
        }
        (Some(key), None) => return Err(format!("missing value for {}", key).into()),
        _ => config,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string(&config)?);
    }
    Ok(())
}

fn cmd_recovery(start: &Path, args: RecoveryCmd, json: bool) -> CmdResult {
    let project = load_project(start)?;
    match args.action {
        Some(RecoveryAction::Path) => {
            println!("{}", recovery::recovery_log_path(&project.dir).display());
        }
        Some(RecoveryAction::Prune(prune)) => {
            let before = prune
                .before
                .as_deref()
                .map(parse_timestamp)
                .transpose()?;
            let removed = recovery::prune_recovery(&project.dir, before, prune.all)?;
            println!("pruned {} entries", removed);
        }
        None => {
            let entries = recovery::read_recovery_entries(&project.dir, Some(args.limit.unwrap_or(10)));
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("recovery log is empty");
            } else {
                for entry in &entries {
                    print!("{}", output::format_recovery_entry(entry));
                }
            }
        }
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}
