use rand::seq::SliceRandom;

pub const DEFAULT_GREETINGS: [&str; 3] = [
    "Hey there! I'm Emma. What's on your mind today?",
    "Hi! Emma here, just joined the chat. What would you like to talk about?",
    "Hello, hello! It's Emma. Tell me anything, I'm all ears.",
];

pub const HELP_TEXT: &str = "I am a bot that can chat with you!";

/// Picks one of a fixed set of greetings at random.
#[derive(Clone, Debug)]
pub struct GreetingPicker {
    greetings: Vec<String>,
}

impl Default for GreetingPicker {
    fn default() -> Self {
        Self::new(DEFAULT_GREETINGS.iter().map(|s| s.to_string()).collect())
    }
}

impl GreetingPicker {
    /// An empty list falls back to the built-in greetings.
    pub fn new(greetings: Vec<String>) -> Self {
        if greetings.is_empty() {
            return Self::default();
        }
        Self { greetings }
    }

    pub fn pick(&self) -> &str {
        self.greetings
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_GREETINGS[0])
    }

    pub fn all(&self) -> &[String] {
        &self.greetings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_returns_a_configured_greeting() {
        let picker = GreetingPicker::default();
        for _ in 0..32 {
            let g = picker.pick();
            assert!(DEFAULT_GREETINGS.contains(&g), "unexpected greeting {g}");
        }
    }

    #[test]
    fn single_greeting_is_always_picked() {
        let picker = GreetingPicker::new(vec!["only".to_string()]);
        assert_eq!(picker.pick(), "only");
    }

    #[test]
    fn empty_list_falls_back_to_defaults() {
        let picker = GreetingPicker::new(Vec::new());
        assert_eq!(picker.all().len(), DEFAULT_GREETINGS.len());
    }
}
