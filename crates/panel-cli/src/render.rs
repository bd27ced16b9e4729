//! Terminal tables for panel results

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use panel_core::AnalystRegistry;
use panel_engine::{
    AnalystSignal, RenderedSignal, RoundTableOutcome, RoundTableResponse, TickerAnalysesResponse,
};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

fn display_name(analyst_id: &str) -> &str {
    AnalystRegistry::global()
        .get(analyst_id)
        .map_or(analyst_id, |analyst| analyst.label)
}

pub fn analysts_table() -> Table {
    let mut table = table(&["id", "name", "category", "description"]);
    for analyst in AnalystRegistry::global().all() {
        table.add_row(vec![
            analyst.id.to_string(),
            analyst.label.to_string(),
            analyst.category.to_string(),
            analyst.description.to_string(),
        ]);
    }
    table
}

fn signals_table(entries: &[AnalystSignal], overall: Option<&RenderedSignal>) -> Table {
    let mut table = table(&["analyst", "signal", "confidence", "reasoning"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(display_name(&entry.agent_name)),
            Cell::new(&entry.signal.signal),
            Cell::new(entry.signal.confidence),
            Cell::new(&entry.signal.reasoning),
        ]);
    }
    if let Some(overall) = overall {
        table.add_row(vec![
            Cell::new("overall").add_attribute(Attribute::Bold),
            Cell::new(&overall.signal).add_attribute(Attribute::Bold),
            Cell::new(overall.confidence).add_attribute(Attribute::Bold),
            Cell::new(""),
        ]);
    }
    table
}

pub fn analyses(response: &TickerAnalysesResponse) -> String {
    let mut out = String::new();
    for (ticker, entries) in response.ticker_analyses.iter() {
        let overall = response.overall.get(ticker.as_str());
        out.push_str(&format!("{ticker}\n{}\n", signals_table(entries, overall)));
    }
    if response.partial {
        out.push_str("run deadline reached: some entries are neutral fallbacks\n");
    }
    out.push_str(&format!("run {}", response.run_id));
    out
}

pub fn round_table(response: &RoundTableResponse) -> String {
    let mut rounds = table(&["round", "agreement", "delta", "carried forward"]);
    for round in &response.rounds {
        rounds.add_row(vec![
            round.round_number.to_string(),
            format!("{:.0}%", round.agreement_ratio * 100.0),
            round
                .convergence_delta
                .map_or_else(|| "-".to_string(), |delta| format!("{delta:.1}")),
            round.carried_forward.join(", "),
        ]);
    }

    let mut summaries = String::new();
    for (ticker, summary) in response.summaries.iter() {
        summaries.push_str(&format!(
            "{ticker}: {}; {}\n",
            summary.consensus_view, summary.discussion_summary
        ));
        for dissent in &summary.dissenting_opinions {
            summaries.push_str(&format!(
                "  dissent {}: {} ({})\n",
                display_name(&dissent.agent_name),
                dissent.signal.signal,
                dissent.signal.reasoning
            ));
        }
    }

    let outcome = match response.outcome {
        RoundTableOutcome::Converged => "converged",
        RoundTableOutcome::Exhausted => "no consensus",
    };
    format!(
        "{}\n{rounds}\n{summaries}{outcome} after {} debate round(s)",
        analyses(&response.result),
        response.rounds_completed
    )
}
