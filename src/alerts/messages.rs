use crate::models::{CategoryScheme, Outcome, PredictionSet, PredictionSource};
use crate::tracker::StrategyScoreboard;

/// Text for a fresh prediction set: the ensemble call first, then each source.
pub fn format_prediction(set: &PredictionSet, scheme: CategoryScheme) -> String {
    let mut lines = Vec::with_capacity(set.predictions.len() + 2);
    match set.ensemble() {
        Some(p) => lines.push(format!(
            "🎯 Next: {} ({:.0}% of votes)",
            scheme.name(p.label),
            p.confidence * 100.0
        )),
        None => lines.push("🎯 Next: no consensus".to_string()),
    }

    for (source, p) in &set.predictions {
        if *source == PredictionSource::Ensemble {
            continue;
        }
        lines.push(format!(
            "  • {}: {} ({:.2})",
            source,
            scheme.name(p.label),
            p.confidence
        ));
    }
    lines.push(format!("after outcome #{}", set.made_at));
    lines.join("\n")
}

/// Text reporting how the previous ensemble call fared.
///
/// `ensemble_hit` is None when no ensemble prediction was pending.
pub fn format_result(
    outcome: &Outcome,
    scheme: CategoryScheme,
    ensemble_hit: Option<bool>,
    scoreboard: &StrategyScoreboard,
) -> String {
    let verdict = match ensemble_hit {
        Some(true) => "🟢 GREEN",
        Some(false) => "🔴 RED",
        None => "⚪ NO CALL",
    };
    let mut text = format!(
        "{} | {} ({})",
        verdict,
        outcome.value,
        scheme.name(scheme.categorize(outcome.value))
    );
    let ensemble = scoreboard.get(&PredictionSource::Ensemble);
    if let Some((score, rate)) = ensemble.and_then(|s| s.hit_rate().map(|r| (s, r))) {
        text.push_str(&format!(
            "\nensemble {}/{} ({:.1}%)",
            score.correct,
            score.total,
            rate * 100.0
        ));
    }
    text
}
