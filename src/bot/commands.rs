/// Inbound commands the bot reacts to. Any other text gets no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    Query,
    Help,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Subscribe => "subscribe",
            Command::Unsubscribe => "unsubscribe",
            Command::Query => "query",
            Command::Help => "help",
        }
    }
}

/// Keyword lists per command, stored lower-case.
#[derive(Debug, Clone)]
pub struct Keywords {
    pub subscribe: Vec<String>,
    pub unsubscribe: Vec<String>,
    pub query: Vec<String>,
    pub help: Vec<String>,
}

impl Default for Keywords {
    fn default() -> Self {
        Self {
            subscribe: words(&["langganan", "subscribe"]),
            unsubscribe: words(&["berhenti", "unsubscribe", "stop"]),
            query: words(&["emas", "harga"]),
            help: words(&["help", "start"]),
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_lowercase()).collect()
}

impl Keywords {
    /// Whole-message, case-insensitive match. One leading `/` is allowed.
    pub fn parse(&self, text: &str) -> Option<Command> {
        let lowered = text.trim().to_lowercase();
        let word = lowered.strip_prefix('/').unwrap_or(&lowered).trim();
        if word.is_empty() {
            return None;
        }

        let hit = |list: &[String]| list.iter().any(|k| k == word);
        if hit(&self.subscribe) {
            Some(Command::Subscribe)
        } else if hit(&self.unsubscribe) {
            Some(Command::Unsubscribe)
        } else if hit(&self.query) {
            Some(Command::Query)
        } else if hit(&self.help) {
            Some(Command::Help)
        } else {
            None
        }
    }
}
