//! Budgeted-context selection.
//!
//! Selects a maximal suffix of completed turn pairs that fits under the token
//! ceiling, always keeping the system turn and the in-flight exchange. The
//! output is ephemeral and never persisted; it exists only as model input.

use tracing::debug;

use crate::counter::TokenCounter;
use parlance_core::{Role, Turn};

/// Ceiling and reply headroom for one selection.
#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    /// Hard token ceiling for the whole context.
    pub ceiling: usize,
    /// Reserved headroom for the model's own reply, subtracted before
    /// selection.
    pub reply_margin: usize,
}

impl BudgetConfig {
    pub fn new(ceiling: usize, reply_margin: usize) -> Self {
        Self {
            ceiling,
            reply_margin,
        }
    }
}

/// Select the budgeted context from the full ordered history of a session.
///
/// Guarantees, in order of precedence:
/// - the system turn is always included and charged first;
/// - all turns sharing `in_flight_pair_id` are always included last,
///   regardless of budget (soft ceiling violations are the caller's to
///   tolerate);
/// - remaining budget is filled with whole pairs scanned newest to oldest,
///   stopping at the first pair that does not fit, so the selected history is
///   always a contiguous suffix;
/// - output is chronological and never reordered after selection.
pub fn budget_context(
    history: &[Turn],
    in_flight_pair_id: &str,
    config: &BudgetConfig,
    counter: &dyn TokenCounter,
) -> Vec<Turn> {
    let system = history.iter().find(|t| t.role == Role::System);
    let in_flight: Vec<&Turn> = history
        .iter()
        .filter(|t| t.pair_id.as_deref() == Some(in_flight_pair_id))
        .collect();

    // Completed pairs in chronological order of their first turn. History is
    // already ordered, so insertion order is pair order.
    let mut pairs: Vec<(&str, Vec<&Turn>)> = Vec::new();
    for turn in history {
        let Some(pair_id) = turn.pair_id.as_deref() else {
            continue;
        };
        if pair_id == in_flight_pair_id {
            continue;
        }
        match pairs.iter_mut().find(|(id, _)| *id == pair_id) {
            Some((_, turns)) => turns.push(turn),
            None => pairs.push((pair_id, vec![turn])),
        }
    }

    let usable = config.ceiling.saturating_sub(config.reply_margin);
    let system_cost = system.map(|t| counter.count(&t.content)).unwrap_or(0);
    let mut remaining = usable.saturating_sub(system_cost);

    // Newest first; stop at the first pair that does not fit. Older pairs are
    // never opportunistically included, which keeps the history contiguous.
    let mut selected: Vec<&(&str, Vec<&Turn>)> = Vec::new();
    for pair in pairs.iter().rev() {
        let cost: usize = pair.1.iter().map(|t| counter.count(&t.content)).sum();
        if cost > remaining {
            break;
        }
        remaining -= cost;
        selected.push(pair);
    }
    selected.reverse();

    let mut context: Vec<Turn> = Vec::new();
    if let Some(system) = system {
        context.push(system.clone());
    }
    for (_, turns) in &selected {
        context.extend(turns.iter().map(|t| (*t).clone()));
    }
    context.extend(in_flight.iter().map(|t| (*t).clone()));

    debug!(
        "Budgeted context: {} of {} pairs selected, {} tokens remaining of {}",
        selected.len(),
        pairs.len(),
        remaining,
        usable
    );

    context
}
