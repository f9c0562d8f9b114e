//! Prompt construction for worker invocations
//!
//! Pure functions: no side effects and no knowledge of scheduling. The
//! generation prompt primes a brand-new task (explore inputs, write the core
//! instructions and bookkeeping files); the run prompt drives one iteration,
//! feeding back whatever the previous run left behind.

use std::path::Path;

use crate::artifacts::{CORE_PROMPT_FILE, HANDOFF_FILE, INDEX_FILE, PROGRESS_FILE, PriorRuns, RUN_OUTPUT_FILE};

/// Build the one-time priming prompt that generates the task's core
/// instructions, progress record, and run index.
pub fn build_generation_prompt(goal: &str, input_materials: &[impl AsRef<Path>], output_dir: &Path) -> String {
    let inputs_list = if input_materials.is_empty() {
        "- (none)".to_string()
    } else {
        input_materials
            .iter()
            .map(|p| format!("- {}", p.as_ref().display()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let progress_seed = serde_json::json!({
        "goal": goal,
        "output_dir": output_dir,
        "next_run_index": 1,
        "runs": [],
        "last_run_at": null,
        "last_output": null,
        "notes": "",
    });

    format!(
        "You are running non-interactively, initializing a repeating task executor.\n\
         \n\
         === PHASE 1: EXPLORE THE INPUT MATERIALS ===\n\
         \n\
         Before generating any files, thoroughly explore and understand the inputs.\n\
         If an input is a directory, list and read its key files; if it is a file,\n\
         read it completely. Identify structure, conventions, and constraints.\n\
         \n\
         Input materials:\n\
         {inputs_list}\n\
         \n\
         The operator's goal:\n\
         ```\n\
         {goal}\n\
         ```\n\
         \n\
         === PHASE 2: GENERATE FILES ===\n\
         \n\
         Output directory: {output_dir}\n\
         \n\
         Hard rules:\n\
         - Only write inside the output directory.\n\
         - Do not modify any other file or directory.\n\
         \n\
         Generate these 3 files in the output directory:\n\
         \n\
         FILE 1: {core}\n\
         The prompt used for every subsequent run. It must contain everything a\n\
         future run needs without re-exploring: the goal verbatim, a context\n\
         summary of what you found in the inputs, the input paths, the output\n\
         directory, a step-by-step execution plan, the write-only-to-output-dir\n\
         constraint, the artifacts each run must produce, and verification\n\
         criteria. Be detailed and actionable; include specific paths and names.\n\
         \n\
         FILE 2: {progress}\n\
         Write this JSON content exactly:\n\
         ```json\n\
         {progress_seed}\n\
         ```\n\
         \n\
         FILE 3: {index}\n\
         Write this content exactly:\n\
         ```markdown\n\
         # Run Index\n\
         \n\
         | Run | Output | Time | Note |\n\
         |---:|---|---|---|\n\
         ```\n\
         \n\
         Explore first, then generate, then reply with a brief confirmation of\n\
         what you explored and wrote.",
        output_dir = output_dir.display(),
        core = CORE_PROMPT_FILE,
        progress = PROGRESS_FILE,
        index = INDEX_FILE,
        progress_seed = serde_json::to_string_pretty(&progress_seed).unwrap_or_default(),
    )
}

/// Build the prompt for a single run: the core instructions plus, after the
/// first run, the prior-run bundle and the handoff contract for the next run.
pub fn build_run_prompt(core_prompt: &str, output_dir: &Path, prior: Option<&PriorRuns>) -> String {
    let mut parts: Vec<String> = vec![core_prompt.to_string(), String::new()];

    if let Some(prior) = prior {
        parts.push("=== REVIEW PREVIOUS RUN OUTPUTS FIRST ===".to_string());
        parts.push(String::new());

        if let Some(handoff) = &prior.handoff {
            parts.push(">>> HANDOFF FROM THE PREVIOUS RUN (read this first) <<<".to_string());
            parts.push("```".to_string());
            parts.push(handoff.clone());
            parts.push("```".to_string());
            parts.push("This is your primary directive for this run.".to_string());
            parts.push(String::new());
        }
        if prior.progress.is_some() {
            parts.push(format!(
                "Read {} to see what prior runs accomplished and what this run should do: {}",
                PROGRESS_FILE,
                output_dir.join(PROGRESS_FILE).display()
            ));
        }
        if prior.index.is_some() {
            parts.push(format!(
                "Read {} for the summary of all previous runs: {}",
                INDEX_FILE,
                output_dir.join(INDEX_FILE).display()
            ));
        }
        if prior.last_output.is_some() {
            parts.push(format!(
                "Read {} for what the last run actually did: {}",
                RUN_OUTPUT_FILE,
                output_dir.join(RUN_OUTPUT_FILE).display()
            ));
        }
        parts.push(format!(
            "{} runs have completed. Build upon their work in {}; do not start from scratch.",
            prior.run_count,
            output_dir.display()
        ));
        parts.push(String::new());
    }

    parts.push("Execute one run now.".to_string());
    parts.push(format!("- Ensure {} is created in {}", RUN_OUTPUT_FILE, output_dir.display()));
    parts.push(format!("- Update {PROGRESS_FILE} and {INDEX_FILE}"));
    parts.push("- Only write inside the output directory; this restriction is absolute.".to_string());
    parts.push(String::new());
    parts.push(format!(
        "At the end of this run, create or update {} in {}: a short, actionable\n\
         note for the next run covering what you accomplished, what the next run\n\
         should focus on, blockers to address, and key files touched. Keep it\n\
         under 500 words.",
        HANDOFF_FILE,
        output_dir.display()
    ));

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_generation_prompt_mentions_artifacts_and_goal() {
        let prompt = build_generation_prompt(
            "summarize the codebase",
            &[PathBuf::from("/data/src")],
            Path::new("/data/out"),
        );
        assert!(prompt.contains("summarize the codebase"));
        assert!(prompt.contains("- /data/src"));
        assert!(prompt.contains(CORE_PROMPT_FILE));
        assert!(prompt.contains(PROGRESS_FILE));
        assert!(prompt.contains(INDEX_FILE));
        assert!(prompt.contains("/data/out"));
    }

    #[test]
    fn test_generation_prompt_empty_inputs() {
        let prompt = build_generation_prompt("goal", &Vec::<PathBuf>::new(), Path::new("/out"));
        assert!(prompt.contains("- (none)"));
    }

    #[test]
    fn test_run_prompt_first_run_has_no_review_section() {
        let prompt = build_run_prompt("CORE", Path::new("/out"), None);
        assert!(prompt.starts_with("CORE"));
        assert!(!prompt.contains("REVIEW PREVIOUS RUN OUTPUTS"));
        assert!(prompt.contains(RUN_OUTPUT_FILE));
        assert!(prompt.contains(HANDOFF_FILE));
    }

    #[test]
    fn test_run_prompt_includes_prior_bundle() {
        let prior = PriorRuns {
            run_count: 2,
            progress: Some("{}".to_string()),
            index: None,
            last_output: Some("done".to_string()),
            handoff: Some("focus on tests".to_string()),
        };
        let prompt = build_run_prompt("CORE", Path::new("/out"), Some(&prior));
        assert!(prompt.contains("focus on tests"));
        assert!(prompt.contains(PROGRESS_FILE));
        assert!(prompt.contains(RUN_OUTPUT_FILE));
        // Index was absent from the bundle, so no instruction to read it
        assert!(!prompt.contains("for the summary of all previous runs"));
        assert!(prompt.contains("2 runs have completed"));
    }
}
