//! Canned replies for a closed set of conversational intents.

use chrono::{Local, NaiveTime, Timelike};

use crate::vocab::tokenize;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveTime;
}

/// Local time of the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Always reports the same time.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        self.0
    }
}

/// Recognized intents, in matching priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Identity,
    TimeOfDay,
    Help,
}

impl Intent {
    pub const ALL: [Intent; 4] = [Intent::Greeting, Intent::Identity, Intent::TimeOfDay, Intent::Help];

    /// Phrases that trigger the intent when they occur as whole words.
    fn phrases(self) -> &'static [&'static str] {
        match self {
            Intent::Greeting => &["xin chào", "chào", "chao", "hello", "hi"],
            Intent::Identity => &["bạn tên gì", "tên bạn là gì", "cậu tên gì", "what is your name", "who are you"],
            Intent::TimeOfDay => &["mấy giờ", "bây giờ là mấy giờ", "giờ bao nhiêu", "what time"],
            Intent::Help => &["giúp", "hỗ trợ", "support", "help"],
        }
    }

    fn matches(self, words: &[String]) -> bool {
        self.phrases().iter().any(|phrase| {
            let phrase: Vec<&str> = phrase.split_whitespace().collect();
            words
                .windows(phrase.len())
                .any(|w| w.iter().zip(&phrase).all(|(a, b)| a == b))
        })
    }
}

/// Pattern matcher over [`Intent`]; the time intent reads its [`Clock`].
pub struct IntentFallback {
    clock: Box<dyn Clock>,
}

impl Default for IntentFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentFallback {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self { clock: Box::new(clock) }
    }

    /// First intent matching `input`, if any.
    pub fn detect(&self, input: &str) -> Option<Intent> {
        let words = tokenize(input);
        if words.is_empty() {
            return None;
        }
        Intent::ALL.into_iter().find(|intent| intent.matches(&words))
    }

    /// Canned reply for the first matching intent.
    pub fn try_answer(&self, input: &str) -> Option<String> {
        self.detect(input).map(|intent| self.reply(intent))
    }

    pub fn reply(&self, intent: Intent) -> String {
        match intent {
            Intent::Greeting => "Xin chào! Mình là trợ lý ảo. Mình có thể giúp gì cho bạn hôm nay?".to_string(),
            Intent::Identity => "Mình là một trợ lý A.I mini. Bạn có thể gọi mình là Bot.".to_string(),
            Intent::TimeOfDay => {
                let now = self.clock.now();
                format!("Bây giờ là {} giờ {} phút (theo máy chủ).", now.hour(), now.minute())
            }
            Intent::Help => {
                "Bạn cứ mô tả vấn đề/nghiệp vụ, mình sẽ gợi ý hướng giải quyết ngắn gọn nhé.".to_string()
            }
        }
    }
}
