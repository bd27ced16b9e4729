//! Persona prompts rendered with MiniJinja

use crate::error::Result;
use crate::snapshot::MarketSnapshot;
use minijinja::Environment;
use panel_core::{Analyst, Statement};
use serde::Serialize;

const SYSTEM_TEMPLATE: &str = r#"You are {{ analyst.label }}, an investment analyst on a panel.
Your approach: {{ analyst.description }}.
Stay in character and judge only from the data you are given.
Answer with a single JSON object and nothing else:
{"signal": "bullish" | "bearish" | "neutral", "confidence": <0-100>, "reasoning": "<two or three sentences>"}
{%- if language == "zh" %}
Write the reasoning in Simplified Chinese.
{%- endif %}"#;

const USER_TEMPLATE: &str = r#"Ticker: {{ snapshot.symbol }}
{%- if start_date and end_date %}
Window: {{ start_date }} to {{ end_date }}
{%- elif start_date %}
Window: from {{ start_date }}
{%- elif end_date %}
Window: until {{ end_date }}
{%- endif %}
Bars: {{ snapshot.bars }}
Last close: {{ snapshot.last_close | round(2) }}
Return over window: {{ snapshot.period_return | round(1) }}%
Return over last sessions: {{ snapshot.recent_return | round(1) }}%
20-day average: {{ snapshot.sma_short | round(2) }}, 50-day average: {{ snapshot.sma_long | round(2) }}
RSI(14): {{ snapshot.rsi | round(1) }}
Annualized volatility: {{ snapshot.volatility | round(1) }}%
Below period high: {{ snapshot.drawdown | round(1) }}%
Recent volume vs average: {{ snapshot.volume_ratio | round(2) }}x
{%- if statements %}

This is round {{ round }} of a round-table discussion. Last round the panel said:
{%- for s in statements %}
- {{ s.analyst_id }}: {{ s.signal }} ({{ s.confidence }}) {{ s.reasoning }}
{%- endfor %}
Reconsider your position. Change it only if the arguments above convince you.
{%- endif %}"#;

/// Variables available to the user prompt
#[derive(Debug, Serialize)]
pub struct PromptVars<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub round: u32,
    pub statements: &'a [Statement],
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Compiled system and user templates
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)?;
        env.add_template("user", USER_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn system(&self, analyst: &Analyst, language: Option<&str>) -> Result<String> {
        let template = self.env.get_template("system")?;
        Ok(template.render(minijinja::context! {
            analyst => analyst,
            language => language.unwrap_or("en"),
        })?)
    }

    pub fn user(&self, vars: &PromptVars<'_>) -> Result<String> {
        let template = self.env.get_template("user")?;
        Ok(template.render(vars)?)
    }
}
