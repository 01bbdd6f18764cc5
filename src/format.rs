use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::clock::Millis;

/// Label language for rendered durations
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Russian,
}

struct Labels {
    hours: &'static str,
    minutes: &'static str,
    seconds: &'static str,
}

impl Locale {
    fn labels(self) -> Labels {
        match self {
            Locale::English => Labels {
                hours: "h",
                minutes: "min",
                seconds: "sec",
            },
            Locale::Russian => Labels {
                hours: "ч",
                minutes: "мин",
                seconds: "сек",
            },
        }
    }
}

/// Render `ms` as "H h M min S sec", dropping zero hours/minutes but always
/// keeping seconds.
pub fn format_duration(ms: Millis, locale: Locale) -> String {
    let labels = locale.labels();
    let total_secs = ms / 1000;
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;

    let mut parts = Vec::with_capacity(3);
    if h > 0 {
        parts.push(format!("{h} {}", labels.hours));
    }
    if m > 0 {
        parts.push(format!("{m} {}", labels.minutes));
    }
    parts.push(format!("{s} {}", labels.seconds));
    parts.join(" ")
}
