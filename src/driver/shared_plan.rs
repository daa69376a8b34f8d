//! The Shared Plan artifact (§6): a human-readable rendering of the
//! structured plan and mission completion status, written non-fatally at
//! finalize time.

use std::fs;
use std::io;
use std::path::Path;

use crate::state::RunState;

/// Render and write the Shared Plan artifact for `state` under
/// `output_root`. Write failures are the caller's to log; this only
/// surfaces the `io::Result` so the caller can decide how loudly to warn.
pub fn write_shared_plan(output_root: &Path, state: &RunState) -> io::Result<()> {
    let mut doc = String::new();
    doc.push_str(&format!("Run: {}\n", state.run_id));
    let parsing_method = state
        .structured_plan
        .as_ref()
        .map(|p| format!("{:?}", p.parsing_method))
        .unwrap_or_else(|| "unknown".to_string());
    doc.push_str(&format!("Parsing method: {parsing_method}\n\n"));

    doc.push_str("Missions:\n");
    for mission in &state.missions {
        let done = state.completed_tasks.iter().any(|m| m == mission);
        let mark = if done { "[x]" } else { "[ ]" };
        let label = if done { "IMPLEMENTED" } else { "PENDING" };
        doc.push_str(&format!("{mark} {label} {mission}\n"));
    }

    if let Some(plan) = &state.structured_plan {
        doc.push_str("\nSteps:\n");
        for step in &plan.steps {
            doc.push_str(&format!(
                "- {} ({}): tools={:?} deps={:?}\n",
                step.id, step.description, step.suggested_tools, step.dependencies
            ));
            if let Some(parent) = &step.parent_id {
                doc.push_str(&format!("  parent: {parent}\n"));
            }
        }

        doc.push_str("\nFlat missions (backward-compatible):\n");
        for mission in &plan.flat_missions {
            doc.push_str(&format!("- {mission}\n"));
        }
    }

    fs::create_dir_all(output_root)?;
    fs::write(output_root.join(format!("shared_plan_{}.txt", state.run_id)), doc)
}
