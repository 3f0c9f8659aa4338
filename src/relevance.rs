//! Dynamic tool relevance filter
//!
//! Narrows the advertised tool set per turn. The core category is always
//! exposed; platform categories are pulled in by keyword triggers in the
//! conversation context, and any tool the model has already used this
//! conversation stays exposed along with its whole category (so a multi-turn
//! exchange doesn't starve the model of siblings once the triggering keyword
//! scrolls out of the context text).

use crate::llm::ToolDefinition;
use crate::tools::ToolRegistry;
use std::collections::BTreeSet;

/// Always-exposed tools
const CORE_TOOLS: &[&str] = &["web_search", "fetch_url", "send_media", "list_skills"];

/// Category rules: (category tools, trigger keywords)
const CATEGORY_RULES: &[(&[&str], &[&str])] = &[
    (
        &["generate_image", "send_media"],
        &["image", "picture", "photo", "draw", "video", "gif", "meme"],
    ),
    (
        &["post_update", "read_timeline"],
        &["tweet", "post", "timeline", "twitter", "follower", "thread"],
    ),
];

/// Select the tool definitions to expose for this turn.
///
/// Pure function: the output is always a subset of the registered
/// definitions, and always contains the core category.
pub fn select(
    registry: &ToolRegistry,
    context_text: &str,
    previously_used: &[String],
) -> Vec<ToolDefinition> {
    let context_lower = context_text.to_lowercase();
    let mut names: BTreeSet<&str> = CORE_TOOLS.iter().copied().collect();

    for (tools, keywords) in CATEGORY_RULES {
        if keywords.iter().any(|kw| context_lower.contains(kw)) {
            names.extend(tools.iter().copied());
        }
    }

    for used in previously_used {
        names.insert(used.as_str());
        // Pull in the whole category of an already-used tool
        for (tools, _) in CATEGORY_RULES {
            if tools.contains(&used.as_str()) {
                names.extend(tools.iter().copied());
            }
        }
    }

    names
        .into_iter()
        .filter_map(|name| registry.lookup(name).map(|t| t.definition()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(defs: &[ToolDefinition]) -> Vec<&str> {
        defs.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn core_tools_always_present() {
        let registry = ToolRegistry::standard();
        let selected = select(&registry, "", &[]);
        let selected = names(&selected);
        for core in CORE_TOOLS {
            assert!(selected.contains(core), "missing core tool {core}");
        }
    }

    #[test]
    fn tweet_context_pulls_social_category_only() {
        let registry = ToolRegistry::standard();
        let selected = select(&registry, "post a tweet", &[]);
        let selected = names(&selected);

        assert!(selected.contains(&"post_update"));
        assert!(selected.contains(&"read_timeline"));
        // Unrelated platform category stays excluded
        assert!(!selected.contains(&"generate_image"));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let registry = ToolRegistry::standard();
        let selected = select(&registry, "Make me an IMAGE of a cat", &[]);
        assert!(names(&selected).contains(&"generate_image"));
    }

    #[test]
    fn used_tool_pulls_its_whole_category() {
        // Later turn whose text no longer mentions the platform: the used
        // tool and its siblings must still be exposed.
        let registry = ToolRegistry::standard();
        let selected = select(&registry, "yes do that", &["post_update".to_string()]);
        let selected = names(&selected);

        assert!(selected.contains(&"post_update"));
        assert!(selected.contains(&"read_timeline"));
    }

    #[test]
    fn unregistered_used_tool_is_dropped() {
        let registry = ToolRegistry::standard();
        let selected = select(&registry, "", &["tool_that_was_removed".to_string()]);
        assert!(!names(&selected).contains(&"tool_that_was_removed"));
    }

    #[test]
    fn output_is_subset_of_registered() {
        let registry = ToolRegistry::standard();
        let selected = select(
            &registry,
            "tweet an image of the timeline",
            &["web_search".to_string()],
        );
        for def in &selected {
            assert!(registry.lookup(&def.name).is_some());
        }
    }

    proptest! {
        #[test]
        fn core_category_present_for_any_input(
            context in ".{0,200}",
            used in proptest::collection::vec("[a-z_]{1,20}", 0..5),
        ) {
            let registry = ToolRegistry::standard();
            let selected = select(&registry, &context, &used);
            let selected: Vec<&str> = selected.iter().map(|d| d.name.as_str()).collect();
            for core in CORE_TOOLS {
                prop_assert!(selected.contains(core));
            }
        }
    }
}
