//! # CLI Command Implementations
//!
//! Each command has a `run_*` function returning its outcome and a `cmd_*`
//! wrapper printing it as text or JSON.

use moldwork_core::{
    Conflict, Diagnostic, EntryRecord, Instance, MoldError, UpdateState, Value, Version,
};
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// LIST COMMAND
// =============================================================================

pub fn run_list(
    instance: &mut Instance,
    group: &str,
    mold: bool,
) -> Result<Vec<EntryRecord>, MoldError> {
    if mold {
        instance.mold_entries(group)
    } else {
        instance.config_entries(group)
    }
}

/// List the entries of a group.
pub fn cmd_list(
    instance: &mut Instance,
    group: &str,
    json_mode: bool,
    verbose: bool,
    mold: bool,
) -> Result<(), MoldError> {
    let records = run_list(instance, group, mold)?;

    if json_mode {
        print_json(&records);
        return Ok(());
    }

    for record in &records {
        if verbose {
            println!("{:<32} {}", record.name, record.type_tag);
        } else {
            println!("{}", record.name);
        }
    }
    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Verification result of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub entry: String,
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Verify the named entries, or every entry of the group when none are named.
///
/// A config is verified against the mold of the same entry name. An entry
/// that cannot be read is reported as invalid.
pub fn run_verify(
    instance: &mut Instance,
    group: &str,
    mold: bool,
    entries: &[String],
) -> Result<Vec<VerifyOutcome>, MoldError> {
    let names: Vec<String> = if entries.is_empty() {
        run_list(instance, group, mold)?
            .into_iter()
            .map(|r| r.name)
            .collect()
    } else {
        entries.to_vec()
    };

    let mut outcomes = Vec::with_capacity(names.len());
    for entry in names {
        let report = if mold {
            verify_mold_entry(instance, group, &entry)
        } else {
            verify_config_entry(instance, group, &entry)
        };
        let diagnostics = match report {
            Ok(diagnostics) => diagnostics,
            Err(e) => vec![Diagnostic {
                path: String::new(),
                message: e.to_string(),
            }],
        };
        outcomes.push(VerifyOutcome {
            entry,
            valid: diagnostics.is_empty(),
            diagnostics,
        });
    }
    Ok(outcomes)
}

fn verify_mold_entry(
    instance: &mut Instance,
    group: &str,
    entry: &str,
) -> Result<Vec<Diagnostic>, MoldError> {
    let mold = instance.mold_read(group, entry)?;
    let report = instance.verify_mold(&mold);
    instance.mold_finished(mold)?;
    Ok(report?.diagnostics)
}

fn verify_config_entry(
    instance: &mut Instance,
    group: &str,
    entry: &str,
) -> Result<Vec<Diagnostic>, MoldError> {
    let mold = instance.mold_read(group, entry)?;
    let report = instance
        .config_read(group, entry, &mold)
        .and_then(|config| {
            let report = instance.verify_config(&config);
            instance.config_finished(config)?;
            report
        });
    instance.mold_finished(mold)?;
    Ok(report?.diagnostics)
}

/// Verify entries and fail when any of them is invalid.
pub fn cmd_verify(
    instance: &mut Instance,
    group: &str,
    json_mode: bool,
    verbose: bool,
    mold: bool,
    entries: &[String],
) -> Result<(), MoldError> {
    let outcomes = run_verify(instance, group, mold, entries)?;
    let failed = outcomes.iter().filter(|o| !o.valid).count();

    if json_mode {
        print_json(&outcomes);
    } else {
        for outcome in &outcomes {
            if outcome.valid {
                if verbose {
                    println!("{}: ok", outcome.entry);
                }
                continue;
            }
            println!("{}: invalid", outcome.entry);
            for diagnostic in &outcome.diagnostics {
                println!("  {}", diagnostic);
            }
        }
        println!();
        println!("{} checked, {} invalid", outcomes.len(), failed);
    }

    if failed > 0 {
        return Err(MoldError::InvalidContext(format!(
            "{} of {} entries failed verification",
            failed,
            outcomes.len()
        )));
    }
    Ok(())
}

// =============================================================================
// GENERATE COMMAND
// =============================================================================

/// Generate a config from the mold `entry` and write it under the same name.
///
/// Returns the version the config was generated at.
pub fn run_generate(
    instance: &mut Instance,
    group: &str,
    entry: &str,
    at: Option<Version>,
) -> Result<Version, MoldError> {
    let mold = instance.mold_read(group, entry)?;
    let written = instance.generate_config(&mold, at).and_then(|config| {
        let version = instance.graph().config_version(&config);
        let written = instance.config_write(group, entry, &config);
        instance.config_finished(config)?;
        written.and(version)
    });
    instance.mold_finished(mold)?;
    written
}

pub fn cmd_generate(
    instance: &mut Instance,
    group: &str,
    json_mode: bool,
    entry: &str,
    at: Option<Version>,
) -> Result<(), MoldError> {
    let version = run_generate(instance, group, entry, at)?;

    if json_mode {
        print_json(&serde_json::json!({
            "entry": entry,
            "version": version.to_string(),
        }));
    } else {
        println!("Generated config '{}' at {}", entry, version);
    }
    Ok(())
}

// =============================================================================
// UPDATE COMMAND
// =============================================================================

/// How an update run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum UpdateOutcome {
    /// The config was migrated and written back.
    Done { version: String },
    /// A conflict had no resolution; nothing was written.
    Conflict { conflict: Conflict },
}

/// Migrate the config `entry` to `target`, answering conflicts from `resolutions`.
///
/// A resolution applies to conflicts whose dotted path or bare name equals
/// its NAME. The config is only written once the update is DONE.
pub fn run_update(
    instance: &mut Instance,
    group: &str,
    entry: &str,
    target: Version,
    resolutions: &[(String, String)],
) -> Result<UpdateOutcome, MoldError> {
    let mold = instance.mold_read(group, entry)?;
    let outcome = instance
        .config_read(group, entry, &mold)
        .and_then(|config| {
            let outcome = migrate(instance, group, entry, &config, target, resolutions);
            instance.config_finished(config)?;
            outcome
        });
    instance.mold_finished(mold)?;
    outcome
}

fn migrate(
    instance: &mut Instance,
    group: &str,
    entry: &str,
    config: &moldwork_core::Config,
    target: Version,
    resolutions: &[(String, String)],
) -> Result<UpdateOutcome, MoldError> {
    let mut update = instance.update_config(config, target)?;
    while update.state() == UpdateState::Conflict {
        let conflict = update.conflict()?.clone();
        let Some((_, text)) = resolutions
            .iter()
            .find(|(name, _)| *name == conflict.path || *name == conflict.name)
        else {
            update.finish();
            return Ok(UpdateOutcome::Conflict { conflict });
        };
        let value_type = conflict
            .value_type
            .or_else(|| conflict.suggestion.as_ref().map(Value::value_type))
            .ok_or_else(|| {
                MoldError::InvalidContext(format!("keyval '{}' has no type", conflict.path))
            })?;
        let value = Value::parse(value_type, text)?;
        instance.update_resolve(&mut update, value)?;
        instance.update_continue(&mut update)?;
    }
    let state = update.finish();
    if state != UpdateState::Done {
        return Err(MoldError::InternalError(format!(
            "update stopped in state {:?}",
            state
        )));
    }
    instance.config_write(group, entry, config)?;
    Ok(UpdateOutcome::Done {
        version: target.to_string(),
    })
}

/// Migrate a config; unresolved conflicts are reported and nothing is written.
pub fn cmd_update(
    instance: &mut Instance,
    group: &str,
    json_mode: bool,
    entry: &str,
    target: Version,
    resolutions: &[(String, String)],
) -> Result<(), MoldError> {
    let outcome = run_update(instance, group, entry, target, resolutions)?;

    if json_mode {
        print_json(&outcome);
    } else {
        match &outcome {
            UpdateOutcome::Done { version } => {
                println!("Updated config '{}' to {}", entry, version);
            }
            UpdateOutcome::Conflict { conflict } => {
                println!("Conflict: {}", conflict);
                println!("Config '{}' left unchanged.", entry);
                println!("Rerun with --resolve {}=VALUE", conflict.path);
            }
        }
    }

    match outcome {
        UpdateOutcome::Done { .. } => Ok(()),
        UpdateOutcome::Conflict { conflict } => Err(MoldError::Conflict(format!(
            "unresolved conflict at {}",
            conflict.path
        ))),
    }
}
