use serde::Serialize;

/// A persona a message can be rewritten into. Id 0 leaves the text untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextFilter {
    pub id: i32,
    pub name: &'static str,
    pub emoji: &'static str,
    pub command: &'static str,
}

const fn filter(
    id: i32,
    name: &'static str,
    emoji: &'static str,
    command: &'static str,
) -> TextFilter {
    TextFilter {
        id,
        name,
        emoji,
        command,
    }
}

pub static TEXT_FILTERS: [TextFilter; 24] = [
    filter(0, "None", "🙄", ""),
    filter(1, "Flirting", "💘", "in a flirty manner"),
    filter(2, "Pirate", "🏴‍☠️", "like a pirate"),
    filter(3, "Shakespeare", "🧙‍♂️", "as if you were a Shakespearean character"),
    filter(4, "Whatever...", "🙃", "in a sarcastic way"),
    filter(5, "Glitch", "💻", "with lots of typing errors"),
    filter(6, "Robot", "🤖", "like a robot, with inputs and outputs"),
    filter(7, "Emoji", "😀", "using only emojis"),
    filter(8, "Yoda", "👽", "like Yoda"),
    filter(9, "Baby Talk", "🍼", "like a baby trying to talk"),
    filter(
        10,
        "Valley Girl",
        "💅",
        "like a stereotypical valley girl, saying 'like' a lot",
    ),
    filter(11, "Grandma", "👵", "like a sweet old grandma telling a story"),
    filter(12, "Caveman", "🪨", "like a caveman with limited vocabulary"),
    filter(13, "Drama Queen", "🎭", "in a dramatic and over-the-top way"),
    filter(14, "Detective Noir", "🕵️‍♂️", "like a noir detective narrating a mystery"),
    filter(15, "Gamer", "🎮", "like a gamer with slang and abbreviations"),
    filter(16, "Alien", "🛸", "like an alien trying to understand humans"),
    filter(17, "Opera Singer", "🎶", "like an opera singer, very dramatic and musical"),
    filter(18, "Medieval Peasant", "🛡️", "like a medieval peasant from a fantasy world"),
    filter(19, "Corporate Jargon", "📊", "using only corporate business jargon"),
    filter(20, "Karen", "🙋‍♀️", "like a person demanding to speak to the manager"),
    filter(21, "Surfer Dude", "🏄", "like a relaxed surfer dude"),
    filter(22, "Minion", "🍌", "like a minion from the Despicable Me movies"),
    filter(
        23,
        "Text Message Teen",
        "📱",
        "like a teenager texting with abbreviations and emojis",
    ),
];

pub fn find_filter(id: i32) -> Option<&'static TextFilter> {
    TEXT_FILTERS.iter().find(|filter| filter.id == id)
}

const REWRITE_DIRECTIVE: &str = "You are an assistant that rewrites the user's message in the same language as it was written, without adding quotation marks.";

/// Prompt sent to the provider for one rewrite.
pub fn rewrite_instruction(filter: &TextFilter, text: &str) -> String {
    format!(
        "{REWRITE_DIRECTIVE}\n\nRewrite the following message {}: '{}'",
        filter.command, text
    )
}
