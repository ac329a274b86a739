//! Styled terminal output

use completion_router::{
    api::{ChatResponse, ProviderId},
    config::Config,
    error::OrchestratorError,
    orchestrator::{RoutePath, RoutePlan},
};
use crossterm::style::{Color, Stylize};

/// Colors used by the CLI
pub struct Theme {
    /// Labels in key/value lines
    pub label: Color,
    pub response: Color,
    pub error: Color,
    /// Secondary info
    pub dim: Color,
    pub success: Color,
    /// Token and cost numbers
    pub stats: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            label: Color::Cyan,
            response: Color::White,
            error: Color::Red,
            dim: Color::DarkGrey,
            success: Color::Green,
            stats: Color::Blue,
        }
    }
}

#[derive(Default)]
pub struct Printer {
    theme: Theme,
}

impl Printer {
    fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!(
            "  {} {}",
            format!("{:<12}", label).with(self.theme.label),
            value
        );
    }

    pub fn response(&self, response: &ChatResponse) {
        println!();
        println!("{}", response.response.as_str().with(self.theme.response));
        println!();

        let mut provider = response.provider.clone();
        if let Some(primary) = &response.fallback_from {
            provider.push_str(&format!(" (fallback from {})", primary));
        }
        if response.cached {
            provider.push_str(" (cached)");
        }
        self.field("provider", provider.with(self.theme.success));

        for tool in &response.tools_used {
            self.field("tool", format!("{} {}", tool.name, tool.arguments).with(self.theme.dim));
        }

        self.field(
            "tokens",
            format!(
                "{} prompt + {} completion = {}",
                response.usage.prompt_tokens, response.usage.completion_tokens, response.usage.total
            )
            .with(self.theme.stats),
        );
        self.field("cost", format!("${:.4}", response.usage.cost).with(self.theme.stats));
    }

    pub fn error(&self, err: &OrchestratorError) {
        let body = err.to_response();
        eprintln!("{} {:?}", "Error:".with(self.theme.error), body.kind);
        if let Some(provider) = &body.provider {
            eprintln!("  {} {}", "provider".with(self.theme.dim), provider);
        }
        eprintln!("  {}", body.message);
    }

    pub fn plan(&self, plan: &RoutePlan) {
        self.field("selected", plan.decision.provider.to_string().with(self.theme.success));
        self.field("rule", plan.decision.rule.to_string());
        self.field("tool gate", if plan.tool_gate { "matched" } else { "no match" });

        let path = match plan.path {
            RoutePath::Tools => "tool round trip",
            RoutePath::Direct => "direct completion",
        };
        self.field("path", format!("{} via {}", path, plan.provider));

        let fallback = plan
            .fallback
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        self.field("fallback", fallback.with(self.theme.dim));
    }

    pub fn providers(&self, config: &Config) {
        println!(
            "{}",
            format!(
                "  {:<10} {:<28} {:>9} {:>9} {:>9}  {}",
                "id", "model", "$/1K in", "$/1K out", "window", "credential"
            )
            .with(self.theme.label)
        );

        for id in ProviderId::ALL {
            let profile = id.profile();
            let settings = config.providers.get(id);
            let model = settings.model.as_deref().unwrap_or(profile.default_model);

            let credential = if !settings.enabled {
                "disabled".with(self.theme.dim)
            } else if settings.has_api_key() {
                "set".with(self.theme.success)
            } else {
                profile.credential_env.with(self.theme.error)
            };

            println!(
                "  {:<10} {:<28} {:>9} {:>9} {:>9}  {}",
                id.as_str(),
                model,
                profile.input_cost_per_1k,
                profile.output_cost_per_1k,
                profile.context_window,
                credential
            );
        }
    }
}
