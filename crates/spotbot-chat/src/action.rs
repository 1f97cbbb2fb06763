//! Typed actions consumed by the conversation state machine.
//!
//! The external UI collaborator turns button presses and free-text messages
//! into these variants; one action produces one transition. This replaces
//! prefix-matching on opaque callback strings.

use rust_decimal::Decimal;
use spotbot_core::OrderSide;

/// How the user wants to attach stop-loss/take-profit protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionChoice {
    /// Free-text price entry for SL then TP.
    Manual,
    /// Percentage presets off the reference price.
    Percent,
    /// No protection.
    Skip,
}

/// One user action delivered to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Start (or restart) the flow. Restarting discards the previous draft.
    Begin(OrderSide),
    /// A pair picked from the favorites keyboard.
    SelectPair(String),
    /// A held asset picked in the sell flow.
    SelectAsset(String),
    /// Sell the entire available balance.
    SellAll,
    /// Sell a quote-denominated portion of the balance.
    SellPartial,
    /// Free-text input: pair symbol, amount, or price depending on state.
    Text(String),
    /// Protection method choice.
    Protection(ProtectionChoice),
    /// Stop-loss percentage preset.
    StopLossPercent(Decimal),
    /// Take-profit percentage preset.
    TakeProfitPercent(Decimal),
    /// Skip the take-profit leg.
    SkipTakeProfit,
    /// Final confirmation of the rendered draft.
    Confirm,
    /// Abort the flow. Valid in every state, idempotent.
    Cancel,
}

impl ChatAction {
    /// Free-text tokens that mean "no SL/TP here": any numeric zero,
    /// `skip`, or `/skip`.
    pub fn is_skip_token(text: &str) -> bool {
        let t = text.trim();
        if t.eq_ignore_ascii_case("skip") || t.eq_ignore_ascii_case("/skip") {
            return true;
        }
        t.parse::<Decimal>().map(|v| v.is_zero()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_tokens() {
        assert!(ChatAction::is_skip_token("0"));
        assert!(ChatAction::is_skip_token("0.00"));
        assert!(ChatAction::is_skip_token("/skip"));
        assert!(ChatAction::is_skip_token("SKIP"));
        assert!(!ChatAction::is_skip_token("0.5"));
        assert!(!ChatAction::is_skip_token("skippy"));
    }
}
