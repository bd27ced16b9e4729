//! LLM-backed personas

use super::prompt::{PromptLibrary, PromptVars};
use super::provider::{CompletionRequest, LLMProvider, Message};
use crate::error::{AgentsError, Result};
use crate::market::{HistoryWindow, MarketDataConfig, MarketDataProvider};
use crate::snapshot::MarketSnapshot;
use async_trait::async_trait;
use panel_core::{AgentRuntime, AnalystRegistry, Context, Direction, Signal, Ticker};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: usize = 600;
const TEMPERATURE: f32 = 0.2;

/// [`AgentRuntime`] that asks a chat model to play each persona
pub struct LlmRuntime {
    provider: Arc<dyn LLMProvider>,
    market: Arc<dyn MarketDataProvider>,
    prompts: PromptLibrary,
    model: String,
    history_days: u64,
}

impl LlmRuntime {
    pub fn new(provider: Arc<dyn LLMProvider>, market: Arc<dyn MarketDataProvider>) -> Result<Self> {
        Ok(Self {
            provider,
            market,
            prompts: PromptLibrary::new()?,
            model: DEFAULT_MODEL.to_string(),
            history_days: MarketDataConfig::default().history_days,
        })
    }

    /// Model from `OPENAI_MODEL` when set
    pub fn with_env(mut self) -> Self {
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_history_days(mut self, days: u64) -> Self {
        self.history_days = days;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, ticker: &Ticker, analyst_id: &str, context: &Context) -> Result<Signal> {
        let analyst = AnalystRegistry::global()
            .get(analyst_id)
            .ok_or_else(|| AgentsError::UnknownAnalyst(analyst_id.to_string()))?;

        let window = HistoryWindow::from_context(context, self.history_days);
        let bars = self.market.price_history(ticker, &window).await?;
        let snapshot = MarketSnapshot::from_bars(ticker.as_str(), &bars)?;

        let statements = if context.round() > 0 {
            context.prior_statements(ticker.as_str())
        } else {
            Vec::new()
        };
        let system = self.prompts.system(analyst, context.language())?;
        let user = self.prompts.user(&PromptVars {
            snapshot: &snapshot,
            round: context.round(),
            statements: &statements,
            start_date: context.start_date().map(|d| d.to_string()),
            end_date: context.end_date().map(|d| d.to_string()),
        })?;

        let request = CompletionRequest::builder(&self.model)
            .system(system)
            .add_message(Message::user(user))
            .max_tokens(MAX_TOKENS)
            .temperature(TEMPERATURE)
            .build();
        let response = self.provider.complete(request).await?;
        debug!(
            tokens = response.usage.total(),
            finish_reason = %response.finish_reason,
            "Persona replied"
        );

        parse_signal_reply(&response.content)
    }
}

#[async_trait]
impl AgentRuntime for LlmRuntime {
    #[instrument(skip(self, context), fields(model = %self.model, round = context.round()))]
    async fn analyze(
        &self,
        ticker: &Ticker,
        analyst_id: &str,
        context: &Context,
    ) -> panel_core::Result<Signal> {
        self.ask(ticker, analyst_id, context)
            .await
            .map_err(|e| e.into_failure(analyst_id))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[derive(Debug, Deserialize)]
struct SignalReply {
    signal: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse a `{signal, confidence, reasoning}` reply
///
/// Tolerates markdown code fences and prose around the JSON object.
pub fn parse_signal_reply(content: &str) -> Result<Signal> {
    let body = extract_json(content)
        .ok_or_else(|| AgentsError::Parse(format!("no JSON object in reply: {}", preview(content))))?;

    let reply: SignalReply = serde_json::from_str(body)
        .map_err(|e| AgentsError::Parse(format!("{e}: {}", preview(body))))?;
    let direction: Direction = reply
        .signal
        .parse()
        .map_err(|_| AgentsError::Parse(format!("unknown signal: {}", reply.signal)))?;

    Ok(Signal::with_score(direction, reply.confidence, reply.reasoning))
}

fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{CompletionResponse, MockLLMProvider, TokenUsage};
    use crate::market::MockMarketDataProvider;
    use crate::snapshot::fixtures::{bars, linear};
    use panel_core::Statement;
    use std::collections::HashMap;

    fn reply(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            finish_reason: "stop".to_string(),
            usage: TokenUsage::default(),
        }
    }

    fn market() -> Arc<MockMarketDataProvider> {
        let mut market = MockMarketDataProvider::new();
        market
            .expect_price_history()
            .returning(|_, _| Ok(bars(&linear(100.0, 120.0, 30))));
        Arc::new(market)
    }

    #[test]
    fn test_parse_plain_json() {
        let signal =
            parse_signal_reply(r#"{"signal": "bullish", "confidence": 72.6, "reasoning": "moat"}"#)
                .unwrap();
        assert_eq!(signal, Signal::buy(73, "moat"));
    }

    #[test]
    fn test_parse_fenced_reply() {
        let content = "Here is my view:\n```json\n{\"signal\": \"卖出\", \"confidence\": 140, \"reasoning\": \"估值过高\"}\n```";
        let signal = parse_signal_reply(content).unwrap();
        assert_eq!(signal.signal, Direction::Sell);
        assert_eq!(signal.confidence, 100);
        assert_eq!(signal.reasoning, "估值过高");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_signal_reply("I would rather not say."),
            Err(AgentsError::Parse(_))
        ));
        assert!(matches!(
            parse_signal_reply(r#"{"signal": "moon", "confidence": 99}"#),
            Err(AgentsError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_analyze_round_trip() {
        let mut provider = MockLLMProvider::new();
        provider
            .expect_complete()
            .withf(|request| {
                request.model == "local-model"
                    && request
                        .system
                        .as_deref()
                        .is_some_and(|s| s.starts_with("You are Warren Buffett"))
                    && request.messages.len() == 1
                    && request.messages[0].content.starts_with("Ticker: AAPL")
            })
            .times(1)
            .returning(|_| Ok(reply(r#"{"signal":"neutral","confidence":55,"reasoning":"fair price"}"#)));

        let runtime = LlmRuntime::new(Arc::new(provider), market())
            .unwrap()
            .with_model("local-model");
        let signal = runtime
            .analyze(&Ticker::parse("AAPL").unwrap(), "warren_buffett_agent", &Context::new())
            .await
            .unwrap();

        assert_eq!(signal, Signal::neutral(55, "fair price"));
    }

    #[tokio::test]
    async fn test_debate_round_includes_peers() {
        let mut provider = MockLLMProvider::new();
        provider
            .expect_complete()
            .withf(|request| request.messages[0].content.contains("- wsb_agent: sell (80) squeeze over"))
            .returning(|_| Ok(reply(r#"{"signal":"bearish","confidence":60,"reasoning":"agree"}"#)));

        let mut context = Context::new().with_round(1);
        context
            .set_prior_statements(&HashMap::from([(
                "AAPL".to_string(),
                vec![Statement::new("wsb_agent", Signal::sell(80, "squeeze over"))],
            )]))
            .unwrap();

        let runtime = LlmRuntime::new(Arc::new(provider), market()).unwrap();
        let signal = runtime
            .analyze(&Ticker::parse("AAPL").unwrap(), "peter_lynch_agent", &context)
            .await
            .unwrap();
        assert_eq!(signal.signal, Direction::Sell);
    }

    #[tokio::test]
    async fn test_provider_error_becomes_agent_failure() {
        let mut provider = MockLLMProvider::new();
        provider
            .expect_complete()
            .returning(|_| Err(crate::llm::LLMError::RateLimitExceeded("slow down".to_string())));

        let runtime = LlmRuntime::new(Arc::new(provider), market()).unwrap();
        let err = runtime
            .analyze(&Ticker::parse("AAPL").unwrap(), "wsb_agent", &Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "wsb_agent failed: Rate limit exceeded: slow down");
    }
}
