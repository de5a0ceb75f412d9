use anyhow::Result;
use siggen_core::policy::{load_policy, FunctionFilter, ItemSelection};
use siggen_core::GenerationPolicy;

use crate::resolve_input;

/// `siggen validate-policy`: load, validate and summarize a policy file.
pub fn validate_policy_command(path: &str) -> Result<()> {
    let resolved = resolve_input(path)?;
    let policy = load_policy(&resolved)?;

    println!("Policy OK: {}", resolved.display());
    for line in policy_summary(&policy) {
        println!("  {line}");
    }
    Ok(())
}

/// Human-readable lines describing the effective settings of `policy`.
pub fn policy_summary(policy: &GenerationPolicy) -> Vec<String> {
    let mut lines = vec![
        format!("Detection name: {}", policy.detection_name),
        format!("Items: {}", policy.items.join(", ")),
    ];

    lines.push(match policy.item_selection {
        ItemSelection::Exact => "Selection: exact".to_string(),
        ItemSelection::Similar => {
            format!("Selection: similar (min similarity {})", policy.min_similarity)
        }
    });
    lines.push(match policy.trim_length {
        Some(budget) => format!(
            "Trim: {budget} bytes via {} (variant {})",
            policy.trim_algorithm.as_str(),
            policy.variant
        ),
        None => "Trim: unbounded".to_string(),
    });
    lines.push(format!("Min piece length: {}", policy.min_piece_length));
    lines.push(match policy.function_filter {
        FunctionFilter::None => "Function filter: none".to_string(),
        mode => {
            let name = if mode == FunctionFilter::Blacklist { "blacklist" } else { "whitelist" };
            let addresses: Vec<String> =
                policy.filtered_functions.iter().map(|a| format!("{a:#x}")).collect();
            format!("Function filter: {name} [{}]", addresses.join(", "))
        }
    });
    lines.push(format!(
        "Nibble masking: {}",
        if policy.disable_nibble_masking { "disabled" } else { "enabled" }
    ));
    lines.push(format!(
        "Publication: {}",
        if policy.disable_publication { "disabled" } else { "enabled" }
    ));
    if !policy.tags.is_empty() {
        lines.push(format!("Tags: {}", policy.tags.join(" ")));
    }
    if !policy.groups.is_empty() {
        lines.push(format!("Groups: {}", policy.groups.join(", ")));
    }
    lines
}
