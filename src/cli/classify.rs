use anyhow::Result;

use crate::config::StrataConfig;
use crate::memory::ttl::{classify as classify_text, TtlPolicy};

/// Print the category and TTL the classifier assigns to `text`. With no
/// text, print the whole TTL table.
pub fn classify(config: &StrataConfig, text: Option<&str>) -> Result<()> {
    let policy = TtlPolicy::with_overrides(&config.scheduler.ttl);

    match text {
        Some(text) => {
            let category = classify_text(text);
            println!("Category:  {category}");
            println!("TTL:       {}", format_secs(policy.ttl_for(category)));
        }
        None => {
            println!("{:<14} {:>10}  {}", "Category", "Seconds", "TTL");
            println!("{}", "-".repeat(40));
            for (category, secs) in policy.entries() {
                println!("{:<14} {:>10}  {}", category.as_str(), secs, format_secs(secs));
            }
        }
    }
    Ok(())
}

fn format_secs(secs: u64) -> String {
    match secs {
        s if s >= 86_400 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s >= 3600 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s >= 60 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}
