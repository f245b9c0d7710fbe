//! Property-based tests
//!
//! Invariants that must hold for arbitrary inputs: sanitizer stability,
//! stream reassembly under arbitrary chunking, and configuration
//! serialization round-trips.

use proptest::prelude::*;

use colloquy_engine::config::Config;
use colloquy_engine::llm::ollama::FragmentAssembler;
use colloquy_engine::sanitizer::Sanitizer;

proptest! {
    // Running the sanitizer on its own output must change nothing, for any
    // persona name and any printable input.
    #[test]
    fn test_sanitize_is_idempotent(
        name in "[A-Z][a-z]{2,8}",
        text in "[ -~]{0,120}",
    ) {
        let sanitizer = Sanitizer::new().unwrap();

        let once = sanitizer.sanitize(&name, &text);
        let twice = sanitizer.sanitize(&name, &once);

        prop_assert_eq!(&twice, &once, "unstable for input {:?}", text);
    }

    // A leading `Name:` echo is always stripped, whatever the name, as long
    // as the remaining content cannot collide with the name itself.
    #[test]
    fn test_sanitize_strips_own_tag_for_any_name(
        name in "[A-Z][a-w]{2,8}",
        content in "[xyz][xyz ]{0,40}",
    ) {
        let sanitizer = Sanitizer::new().unwrap();

        let raw = format!("{}: {}", name, content);
        let out = sanitizer.sanitize(&name, &raw);

        prop_assert_eq!(out, content.trim_end());
    }
}

proptest! {
    // Reassembled fragments must not depend on how the network splits the
    // byte stream, including splits inside a multi-byte character.
    #[test]
    fn test_assembler_output_is_chunking_invariant(
        fragments in proptest::collection::vec("[a-zA-Zé ]{0,12}", 1..8),
        chunk_len in 1usize..20,
    ) {
        let mut body = String::new();
        for fragment in &fragments {
            body.push_str(
                &serde_json::json!({"message": {"content": fragment}, "done": false}).to_string(),
            );
            body.push('\n');
        }
        body.push_str(&serde_json::json!({"message": {"content": ""}, "done": true}).to_string());
        body.push('\n');

        let mut assembler = FragmentAssembler::new();
        let mut collected: Vec<String> = Vec::new();
        for chunk in body.as_bytes().chunks(chunk_len) {
            if assembler.is_done() {
                break;
            }
            collected.extend(assembler.push(chunk).unwrap());
        }

        prop_assert!(assembler.is_done());

        let expected: String = fragments.concat();
        prop_assert_eq!(collected.concat(), expected.clone());
        prop_assert_eq!(assembler.into_text(), expected);
    }
}

proptest! {
    // Any valid configuration survives a TOML round-trip unchanged.
    #[test]
    fn test_config_round_trip(
        log_level in "error|warn|info|debug|trace",
        base_url in "http://[a-z]{3,10}:[1-9][0-9]{3}",
        timeout in 1u64..600,
        max_turns in 1usize..64,
        window in 1usize..32,
    ) {
        let mut config = Config::default();
        config.core.log_level = log_level;
        config.backend.base_url = base_url;
        config.backend.request_timeout_secs = timeout;
        config.conversation.max_turns = max_turns;
        config.conversation.default_transcript_window = window;

        let toml_string = toml::to_string(&config).expect("Failed to serialize Config");
        let parsed: Config = toml::from_str(&toml_string).expect("Failed to parse serialized Config");

        prop_assert_eq!(config, parsed);
    }
}
