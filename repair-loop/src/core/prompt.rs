//! Repair prompt builder.
//!
//! Renders the embedded `prompts/repair.md` template. Output depends only on
//! the language profile, the diagnostics and the content, so identical
//! inputs always produce the identical prompt.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::language::LanguageProfile;
use crate::core::types::DiagnosticRecord;

const REPAIR_TEMPLATE: &str = include_str!("../prompts/repair.md");

#[derive(Debug, Serialize)]
struct StaticErrorContext<'a> {
    line: u32,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct TestFailureContext<'a> {
    test_name: &'a str,
    line: u32,
    message: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
    language: LanguageProfile,
}

impl PromptBuilder {
    pub fn new(language: LanguageProfile) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_template("repair", REPAIR_TEMPLATE)
            .expect("repair template should be valid");
        Self { env, language }
    }

    /// Build the repair request for `content` and the diagnostics of one snapshot.
    pub fn build(
        &self,
        content: &str,
        static_errors: &[DiagnosticRecord],
        test_failures: &[DiagnosticRecord],
    ) -> Result<String> {
        let static_errors: Vec<_> = static_errors
            .iter()
            .map(|r| StaticErrorContext {
                line: r.line,
                message: &r.message,
            })
            .collect();
        let test_failures: Vec<_> = test_failures
            .iter()
            .map(|r| TestFailureContext {
                test_name: &r.test_name,
                line: r.line,
                message: &r.message,
            })
            .collect();

        let template = self.env.get_template("repair")?;
        let rendered = template.render(context! {
            standard => self.language.standard,
            requirements => self.language.requirements,
            fence_tag => self.language.fence_tag,
            static_errors => static_errors,
            test_failures => test_failures,
            content => content,
        })?;
        debug!(bytes = rendered.len(), "rendered repair prompt");
        Ok(rendered)
    }
}
