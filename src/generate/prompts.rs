//! Prompt builders for each generated artifact.
//!
//! Every builder returns a complete, self-contained prompt; the completion
//! provider keeps no conversation state between calls.

use crate::models::{Attachment, paths};

/// Directory the generated app exports its static site into.
pub const EXPORT_DIR: &str = "output";

/// Inputs for application code generation.
#[derive(Debug, Clone, Copy)]
pub struct CodeBrief<'a> {
    pub brief: &'a str,
    pub checks: &'a [String],
    pub attachments: &'a [Attachment],
    /// Code from the previous round; `Some` switches to update mode.
    pub previous_code: Option<&'a str>,
}

fn checks_section(checks: &[String]) -> String {
    if checks.is_empty() {
        return "- None specified.\n".to_string();
    }
    checks.iter().map(|c| format!("- {}\n", c)).collect()
}

fn attachment_preview(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return "- None\n".to_string();
    }
    attachments
        .iter()
        .map(|a| {
            let preview: String = a.url.chars().take(64).collect();
            format!("- {} (preview: {}...)\n", a.name, preview)
        })
        .collect()
}

const DATA_JSON_SAMPLE: &str = r#"{
  "attachments": [
    { "name": "sample.png", "url": "data:image/png;base64,iVBORw..." }
  ]
}"#;

/// Prompt for `app.py`, either from scratch or as an update of prior code.
pub fn build_code_prompt(input: &CodeBrief<'_>) -> String {
    match input.previous_code {
        None => build_initial_code_prompt(input),
        Some(previous) => build_update_code_prompt(input, previous),
    }
}

fn build_initial_code_prompt(input: &CodeBrief<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "TASK: Build {} from the BRIEF and FUNCTIONAL REQUIREMENTS below.\n\
         Default to a small, generic Python app. If the brief or any check mentions Flask, use Flask \
         with its normal conventions.\n\
         The exported static site must visibly demonstrate every condition in the brief and checks.\n\n",
        paths::CODE
    ));

    prompt.push_str("--- BRIEF ---\n");
    prompt.push_str(input.brief);
    prompt.push_str("\n\n--- FUNCTIONAL REQUIREMENTS ---\n");
    prompt.push_str(&checks_section(input.checks));
    prompt.push_str("Ignore requirements about the README or repository setup.\n\n");

    prompt.push_str(&format!(
        "--- ATTACHMENTS ---\nAt runtime load attachments from {} in the repo root, shaped like:\n{}\n\
         Attachments to process:\n{}\n",
        paths::DATA,
        DATA_JSON_SAMPLE,
        attachment_preview(input.attachments)
    ));

    prompt.push_str(&format!(
        "--- MODES ---\n\
         1. `python {code}` serves the app dynamically.\n\
         2. `python {code} --export` writes every page, asset and decoded attachment into '{out}/' \
         and exits without user interaction. Render templates through the framework inside an \
         application context so no template syntax reaches the exported HTML.\n\n",
        code = paths::CODE,
        out = EXPORT_DIR
    ));

    prompt.push_str(
        "--- RULES ---\n\
         - Decode data URIs at runtime; never hardcode attachment contents.\n\
         - All exported files live in the export directory and are linked relatively.\n\
         - The exported site is self-contained: no redirects or external links needed to inspect it.\n\
         - Never show words like 'static export' or 'development mode' on rendered pages.\n\
         - Escape literal braces when building strings with str.format().\n\
         - Standard 4-space Python 3 indentation, no syntax errors.\n\n",
    );

    prompt.push_str(&format!(
        "--- OUTPUT ---\nOutput ONLY the full code for {}. No markdown, code fences or explanations.",
        paths::CODE
    ));
    prompt
}

fn build_update_code_prompt(input: &CodeBrief<'_>, previous: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "TASK: Update ONLY the feature logic of the {code} below to satisfy the revised brief and \
         functional checks.\n\
         Keep structure, {data} handling, export routines, dual-mode switches, imports and file naming \
         exactly as they are unless the new requirements force a change.\n\n",
        code = paths::CODE,
        data = paths::DATA
    ));

    prompt.push_str("--- REVISED BRIEF ---\n");
    prompt.push_str(input.brief);
    prompt.push_str("\n\n--- FUNCTIONAL REQUIREMENTS ---\n");
    prompt.push_str(&checks_section(input.checks));
    prompt.push_str("\n--- ATTACHMENTS ---\n");
    prompt.push_str(&attachment_preview(input.attachments));

    prompt.push_str(&format!(
        "\n--- PREVIOUS {code} (START) ---\n{previous}\n--- PREVIOUS {code} (END) ---\n\n",
        code = paths::CODE,
        previous = previous
    ));

    prompt.push_str(&format!(
        "--- OUTPUT ---\nOutput ONLY the new, complete {}. No markdown, code fences or explanations. \
         It must run without syntax or indentation errors.",
        paths::CODE
    ));
    prompt
}

/// Prompt for `README.md`, grounded on the generated code.
pub fn build_readme_prompt(repo_name: &str, brief: &str, owner: &str, code: &str) -> String {
    format!(
        "Write a comprehensive, user-friendly {readme} for the GitHub repository '{repo}'.\n\n\
         Treat this code as the source of truth:\n--- START {code_file} ---\n{code}\n--- END {code_file} ---\n\n\
         --- PROJECT SUMMARY ---\n{brief}\n\n\
         Cover: prerequisites, installing requirements, running in development and export modes \
         (including any {data} preparation), usage, and a walkthrough of the code's structure.\n\
         Summarise the MIT license. Link the live site: https://{owner}.github.io/{repo}/\n\
         End by stating that the README and code were generated with an AI tool.",
        readme = paths::README,
        repo = repo_name,
        code_file = paths::CODE,
        code = code,
        brief = brief,
        data = paths::DATA,
        owner = owner,
    )
}

/// Prompt for `requirements.txt`.
pub fn build_requirements_prompt(code: &str) -> String {
    format!(
        "List the {req} content for this code:\n{code}\n\n\
         Exclude standard-library modules. One package per line with a version when known. \
         Output plain text only, no code fences or explanations.",
        req = paths::REQUIREMENTS,
        code = code
    )
}

/// Prompt for `LICENSE`. Honors a license named in the checks, else MIT.
pub fn build_license_prompt(checks: &[String]) -> String {
    format!(
        "Write a LICENSE file. If one of these functional checks names a license, use it; \
         otherwise use the MIT license.\n\n--- FUNCTIONAL REQUIREMENTS ---\n{}\n\
         Output the license as plain text only, no code fences or explanations.",
        checks_section(checks)
    )
}

/// Prompt for the Pages deployment workflow.
pub fn build_workflow_prompt(brief: &str, code: &str, checks: &[String], workflow_file: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "TASK: Generate a GitHub Actions workflow ({}) that exports the app below as a static \
         site and deploys it to GitHub Pages.\n\n",
        workflow_file
    ));
    prompt.push_str("--- APP BRIEF ---\n");
    prompt.push_str(brief);
    prompt.push_str("\n\n--- FUNCTIONAL REQUIREMENTS ---\n");
    prompt.push_str(&checks_section(checks));
    prompt.push_str(&format!(
        "\n--- REFERENCE CODE ---\n----- BEGIN {code_file} -----\n{code}\n----- END {code_file} -----\n\n",
        code_file = paths::CODE,
        code = code
    ));
    prompt.push_str(&format!(
        "--- REQUIREMENTS ---\n\
         1. Trigger only on pushes to main that change '{code_file}', and on workflow_dispatch.\n\
         2. Permissions: contents: read, pages: write, id-token: write. Concurrency group 'pages'.\n\
         3. Job 'build': actions/checkout@v4; actions/setup-python@v4 with Python 3.11; a Gitleaks \
         secret scan that fails the build on findings; install {req}; verify {data} exists; run \
         `python {code_file} --export`; upload '{out}/' with actions/upload-pages-artifact@v4.\n\
         4. Job 'deploy': needs build, environment github-pages, actions/deploy-pages@v4.\n\n\
         Output ONLY valid YAML. No markdown fences, no explanations.",
        code_file = paths::CODE,
        req = paths::REQUIREMENTS,
        data = paths::DATA,
        out = EXPORT_DIR
    ));
    prompt
}
