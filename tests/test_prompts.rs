//! Tests for the shipped prompt layers in config/prompts

use std::fs;

use chatrag::chat::prompt::{context_template, render_context, system_prompt};

#[test]
fn test_system_prompt_file_exists() {
    let text = fs::read_to_string("config/prompts/system.md").expect("system.md prompt file missing");
    assert!(!text.trim().is_empty());
}

#[test]
fn test_context_template_vars() {
    let text = fs::read_to_string("config/prompts/context.txt").expect("context.txt prompt file missing");
    assert!(text.contains("{{context_str}}"), "context.txt should contain {{context_str}} variable");
    assert!(text.contains("{{query_str}}"), "context.txt should contain {{query_str}} variable");
}

#[test]
fn test_shipped_layers_render() {
    let dir = std::path::Path::new("config/prompts");
    assert!(!system_prompt(dir, "").is_empty());

    let rendered = render_context(&context_template(dir), "file_path: a.md\n\nalpha", "what is alpha?");
    assert!(rendered.contains("alpha"));
    assert!(rendered.contains("what is alpha?"));
    assert!(!rendered.contains("{{"));
}
