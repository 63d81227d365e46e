//! Which prompts each provider runs

use std::collections::BTreeMap;

use crate::domain::prompt::Prompt;
use crate::domain::provider::ApiProvider;

/// Whether `prompt` passes an allow-list
///
/// No list allows everything and an empty list allows nothing. An entry
/// matches the prompt's label or id exactly, or names its `group:` prefix.
pub fn is_allowed_prompt(prompt: &Prompt, allowed: Option<&[String]>) -> bool {
    let Some(allowed) = allowed else {
        return true;
    };

    allowed.iter().any(|entry| {
        prompt.label == *entry
            || prompt.id.as_deref() == Some(entry.as_str())
            || prompt
                .label
                .strip_prefix(entry.as_str())
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// Indices of the prompts `provider` runs
///
/// Both the provider's own allow-list and the suite's provider-prompt map
/// (keyed by provider id or label) must allow a prompt.
pub fn prompts_for_provider(
    provider: &dyn ApiProvider,
    prompts: &[Prompt],
    provider_prompt_map: &BTreeMap<String, Vec<String>>,
) -> Vec<usize> {
    let mapped = provider_prompt_map
        .get(provider.id())
        .or_else(|| provider.label().and_then(|l| provider_prompt_map.get(l)))
        .map(Vec::as_slice);

    prompts
        .iter()
        .enumerate()
        .filter(|(_, prompt)| {
            is_allowed_prompt(prompt, provider.allowed_prompts()) && is_allowed_prompt(prompt, mapped)
        })
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::MockProvider;

    fn allow(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_undefined_allow_list_allows() {
        assert!(is_allowed_prompt(&Prompt::new("x").with_label("a"), None));
    }

    #[test]
    fn test_exact_label_is_allowed() {
        let list = allow(&["greeting"]);
        assert!(is_allowed_prompt(&Prompt::new("x").with_label("greeting"), Some(list.as_slice())));
    }

    #[test]
    fn test_group_prefix_is_allowed() {
        let list = allow(&["group1"]);
        assert!(is_allowed_prompt(&Prompt::new("x").with_label("group1:prompt1"), Some(list.as_slice())));
        assert!(!is_allowed_prompt(&Prompt::new("x").with_label("group10:prompt1"), Some(list.as_slice())));
    }

    #[test]
    fn test_empty_allow_list_denies() {
        let list: Vec<String> = Vec::new();
        assert!(!is_allowed_prompt(&Prompt::new("x").with_label("a"), Some(list.as_slice())));
    }

    #[test]
    fn test_unmatched_label_is_denied() {
        let list = allow(&["group2", "other"]);
        assert!(!is_allowed_prompt(&Prompt::new("x").with_label("group1:prompt1"), Some(list.as_slice())));
    }

    #[test]
    fn test_prompts_for_provider_combines_lists() {
        let prompts = vec![
            Prompt::new("a").with_label("math:add"),
            Prompt::new("b").with_label("math:sub"),
            Prompt::new("c").with_label("chat"),
        ];
        let provider = MockProvider::new("calc").with_allowed_prompts(vec!["math"]);

        let mut map = BTreeMap::new();
        assert_eq!(prompts_for_provider(&provider, &prompts, &map), vec![0, 1]);

        map.insert("calc".to_string(), allow(&["math:sub", "chat"]));
        assert_eq!(prompts_for_provider(&provider, &prompts, &map), vec![1]);

        let open = MockProvider::new("open");
        assert_eq!(prompts_for_provider(&open, &prompts, &BTreeMap::new()), vec![0, 1, 2]);
    }
}
