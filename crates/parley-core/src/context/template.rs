//! `{{variable}}` template filling for system prompts and user input.

use chrono::Local;

use parley_types::chat::SessionConfig;
use parley_types::config::DEFAULT_CUTOFF_KEY;

use super::EngineContext;

const INPUT_VAR: &str = "{{input}}";

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub service_provider: String,
    pub cutoff: String,
    pub model: String,
    pub time: String,
    pub lang: String,
}

impl TemplateVars {
    /// Variables for a session at the current local time.
    pub fn for_session(ctx: &EngineContext, config: &SessionConfig) -> Self {
        Self {
            service_provider: ctx.provider_label.clone(),
            cutoff: knowledge_cutoff(ctx, config),
            model: config.model.clone(),
            time: Local::now().format("%a %b %d %Y %H:%M:%S %z").to_string(),
            lang: ctx.locale.clone(),
        }
    }
}

/// Knowledge cutoff for the session's model.
///
/// A per-session override wins, then the model's table entry, then the
/// table's `default` entry.
pub fn knowledge_cutoff(ctx: &EngineContext, config: &SessionConfig) -> String {
    config
        .knowledge_cutoff
        .clone()
        .or_else(|| ctx.knowledge_cutoff.get(&config.model).cloned())
        .or_else(|| ctx.knowledge_cutoff.get(DEFAULT_CUTOFF_KEY).cloned())
        .unwrap_or_default()
}

/// Render `template` around `input`.
///
/// When `input` already starts with the template text the template is
/// dropped, so re-sending a filled message does not nest it. A template
/// without `{{input}}` gets it appended on a new line. `{{input}}` is
/// substituted last, so placeholders typed by the user are left alone.
pub fn fill_template(template: &str, input: &str, vars: &TemplateVars) -> String {
    let mut output = if !template.is_empty() && input.starts_with(template) {
        String::new()
    } else {
        template.to_string()
    };

    if !output.contains(INPUT_VAR) {
        output.push('\n');
        output.push_str(INPUT_VAR);
    }

    output
        .replace("{{ServiceProvider}}", &vars.service_provider)
        .replace("{{cutoff}}", &vars.cutoff)
        .replace("{{model}}", &vars.model)
        .replace("{{time}}", &vars.time)
        .replace("{{lang}}", &vars.lang)
        .replace(INPUT_VAR, input)
}
