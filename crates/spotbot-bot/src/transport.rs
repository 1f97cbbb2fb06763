//! Console chat transport.
//!
//! The conversation engine is transport-agnostic; this module is the
//! line-oriented stand-in for a chat client. It renders a `StepReply` with
//! numbered options and maps typed lines back to the typed action the
//! engine consumes: a bare number picks the matching option, anything else
//! is free text for the current step.

use spotbot_chat::{ChatAction, ReplyOption, StepReply};

/// A top-level command typed at the console prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Buy,
    Sell,
    QuickBuy,
    QuickSell,
    Balances,
    History(String),
    OpenOrders,
    Watch(String),
    Unwatch(String),
    AlertsOn,
    AlertsOff,
    Cancel,
    Help,
    Quit,
}

/// Parse a slash command. Non-commands return `None` and are routed to the
/// active conversation as free text.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.trim().split_whitespace();
    let head = parts.next()?;
    let arg = parts.next().map(str::to_uppercase);

    match head.to_ascii_lowercase().as_str() {
        "/buy" => Some(ConsoleCommand::Buy),
        "/sell" => Some(ConsoleCommand::Sell),
        "/quickbuy" => Some(ConsoleCommand::QuickBuy),
        "/quicksell" => Some(ConsoleCommand::QuickSell),
        "/balances" => Some(ConsoleCommand::Balances),
        "/history" => arg.map(ConsoleCommand::History),
        "/open" => Some(ConsoleCommand::OpenOrders),
        "/watch" => arg.map(ConsoleCommand::Watch),
        "/unwatch" => arg.map(ConsoleCommand::Unwatch),
        "/alerts" => match arg.as_deref() {
            Some("ON") => Some(ConsoleCommand::AlertsOn),
            Some("OFF") => Some(ConsoleCommand::AlertsOff),
            _ => None,
        },
        "/cancel" => Some(ConsoleCommand::Cancel),
        "/help" | "/start" => Some(ConsoleCommand::Help),
        "/quit" | "/exit" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

/// Render a reply with its options as a numbered list.
pub fn render_reply(reply: &StepReply) -> String {
    let mut out = reply.text.clone();
    for (i, option) in reply.options.iter().enumerate() {
        out.push_str(&format!("\n  [{}] {}", i + 1, option.label));
    }
    out
}

/// Map an input line to an action against the options of the last reply.
pub fn select_action(line: &str, options: &[ReplyOption]) -> ChatAction {
    let trimmed = line.trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        if index >= 1 && index <= options.len() {
            return options[index - 1].action.clone();
        }
    }
    ChatAction::Text(trimmed.to_string())
}

pub const HELP_TEXT: &str = "\
Commands:
  /buy              start a buy (amount in quote currency)
  /sell             start a sell from your holdings
  /quickbuy         quantity-first buy, executes without confirmation
  /quicksell        protected exit for a full holding
  /balances         show significant balances with estimated values
  /history SYMBOL   show recent trades for a symbol
  /open             show open orders
  /watch SYMBOL     add a symbol to the price-move watch list
  /unwatch SYMBOL   remove a symbol from the watch list
  /alerts on|off    toggle price-move alerts
  /cancel           cancel the current operation
  /quit             exit";

#[cfg(test)]
mod tests {
    use super::*;
    use spotbot_chat::StepOutcome;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/buy"), Some(ConsoleCommand::Buy));
        assert_eq!(parse_command("  /QUIT "), Some(ConsoleCommand::Quit));
        assert_eq!(
            parse_command("/history btcusdt"),
            Some(ConsoleCommand::History("BTCUSDT".to_string()))
        );
        assert_eq!(parse_command("/alerts on"), Some(ConsoleCommand::AlertsOn));
        assert_eq!(parse_command("/alerts"), None);
        assert_eq!(parse_command("/history"), None);
        assert_eq!(parse_command("100"), None);
        assert_eq!(parse_command("/skip"), None);
    }

    #[test]
    fn test_select_action_by_number_or_text() {
        let options = vec![
            ReplyOption::new("BTCUSDT", ChatAction::SelectPair("BTCUSDT".to_string())),
            ReplyOption::new("Cancel", ChatAction::Cancel),
        ];
        assert_eq!(
            select_action("1", &options),
            ChatAction::SelectPair("BTCUSDT".to_string())
        );
        assert_eq!(select_action("2", &options), ChatAction::Cancel);
        // Out-of-range numbers and free text go to the step as text.
        assert_eq!(
            select_action("3", &options),
            ChatAction::Text("3".to_string())
        );
        assert_eq!(
            select_action(" 100.5 ", &options),
            ChatAction::Text("100.5".to_string())
        );
    }

    #[test]
    fn test_render_reply_numbers_options() {
        let reply = StepReply {
            text: "Pick one".to_string(),
            options: vec![
                ReplyOption::new("A", ChatAction::Confirm),
                ReplyOption::new("B", ChatAction::Cancel),
            ],
            outcome: StepOutcome::Continue,
        };
        let rendered = render_reply(&reply);
        assert!(rendered.contains("[1] A"));
        assert!(rendered.contains("[2] B"));
    }
}
