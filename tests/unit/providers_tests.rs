/*!
 * Tests for provider helpers and mock backends
 */

use anyhow::Result;

use dubwai::app_config::{SpeechConfig, SpeechProvider, TranslationConfig, TranslationProvider};
use dubwai::errors::ProviderError;
use dubwai::media;
use dubwai::providers::mock::{self, MockBehavior, MockSynthesizer, MockTranslator};
use dubwai::providers::ollama::{self, Ollama};
use dubwai::providers::{self, SpeechSynthesizer, Translator};
use crate::common::{self, TEST_SAMPLE_RATE};

#[test]
fn test_buildBatchPrompt_shouldNumberEveryEntry() {
    let texts = vec!["Hello there.".to_string(), "How are you?".to_string()];

    let prompt = providers::build_batch_prompt(&texts);

    assert!(prompt.contains("<<ENTRY_0>>\nHello there.\n"));
    assert!(prompt.contains("<<ENTRY_1>>\nHow are you?\n"));
    assert!(prompt.ends_with(providers::END_MARKER));
}

#[test]
fn test_parseMarkedEntries_withChattyResponse_shouldIgnoreTextAroundMarkers() -> Result<()> {
    let response = "Sure, here you go:\n<<ENTRY_0>> Сәлам.\n<<ENTRY_1>>\nХәлләр ничек?\n<<END>>\nHope this helps!";

    let entries = providers::parse_marked_entries(response, 2)?;

    assert_eq!(entries, vec!["Сәлам.".to_string(), "Хәлләр ничек?".to_string()]);
    Ok(())
}

#[test]
fn test_parseMarkedEntries_withEmptyEntry_shouldFail() {
    let response = "<<ENTRY_0>>\n\n<<ENTRY_1>>\nTwo\n<<END>>";

    assert!(matches!(
        providers::parse_marked_entries(response, 2),
        Err(ProviderError::ParseError(_))
    ));
}

#[test]
fn test_parseChatResponse_withSingleObject_shouldParse() -> Result<()> {
    let body = r#"{"model":"llama3.2:3b","message":{"role":"assistant","content":"<<ENTRY_0>>\nSälam"},"done":true}"#;

    let response = ollama::parse_chat_response(body)?;

    assert_eq!(response.model, "llama3.2:3b");
    assert!(response.message.content.contains("Sälam"));
    Ok(())
}

#[test]
fn test_parseChatResponse_withStreamedLines_shouldConcatenateContent() -> Result<()> {
    let body = concat!(
        r#"{"model":"m","message":{"role":"assistant","content":"<<ENTRY_0>>\nSä"},"done":false}"#,
        "\n",
        r#"{"model":"m","message":{"role":"assistant","content":"lam"},"done":false}"#,
        "\n",
        r#"{"model":"m","message":{"role":"assistant","content":""},"done":true}"#,
        "\n",
    );

    let response = ollama::parse_chat_response(body)?;

    assert_eq!(response.message.content, "<<ENTRY_0>>\nSälam");
    assert!(response.done);
    Ok(())
}

#[test]
fn test_parseChatResponse_withGarbage_shouldReturnParseError() {
    assert!(matches!(
        ollama::parse_chat_response("<html>502 Bad Gateway</html>"),
        Err(ProviderError::ParseError(_))
    ));
}

#[test]
fn test_ollamaNew_withInvalidUrl_shouldFail() {
    assert!(Ollama::new("not a url", "llama3.2:3b", 30).is_err());
    assert!(Ollama::new("http://localhost:11434/", "llama3.2:3b", 30).is_ok());
}

#[test]
fn test_buildTranslator_withEachProvider_shouldSelectBackend() -> Result<()> {
    let mut config = TranslationConfig::default();
    assert_eq!(providers::build_translator(&config)?.name(), "ollama");

    config.provider = TranslationProvider::LMStudio;
    assert!(providers::build_translator(&config).is_ok());

    config.active_provider_config_mut().endpoint = "::bad::".to_string();
    assert!(providers::build_translator(&config).is_err());
    Ok(())
}

#[test]
fn test_buildSynthesizer_withPreview_shouldUseSilentRenders() -> Result<()> {
    let config = SpeechConfig {
        provider: SpeechProvider::Preview,
        ..SpeechConfig::default()
    };

    let synthesizer = providers::build_synthesizer(&config)?;

    assert_eq!(synthesizer.name(), "mock-speech");
    Ok(())
}

#[test]
fn test_estimatedSpeechDuration_shouldHaveFloor() {
    assert_eq!(mock::estimated_speech_duration("Hi"), 0.3);
    assert_eq!(mock::estimated_speech_duration(&"a".repeat(30)), 2.0);
}

#[tokio::test]
async fn test_mockTranslator_shouldPrefixTargetLanguage() -> Result<()> {
    let translator = MockTranslator::working();
    let texts = vec!["One".to_string(), "Two".to_string()];

    let lines = translator.translate_batch(&texts, "en", "tt").await?;

    assert_eq!(lines, vec!["[tt] One".to_string(), "[tt] Two".to_string()]);
    assert_eq!(translator.request_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_mockTranslator_withTruncatedBehavior_shouldDropLastLine() -> Result<()> {
    let translator = MockTranslator::new(MockBehavior::Truncated);
    let texts = vec!["One".to_string(), "Two".to_string()];

    let lines = translator.translate_batch(&texts, "en", "tt").await?;

    assert_eq!(lines.len(), 1);
    Ok(())
}

#[test]
fn test_mockTranslator_failing_shouldFailConnectionCheck() {
    let translator = MockTranslator::failing();

    let (connection, batch) = tokio_test::block_on(async {
        (
            translator.test_connection().await,
            translator.translate_batch(&["x".to_string()], "en", "tt").await,
        )
    });

    assert!(matches!(connection, Err(ProviderError::ConnectionError(_))));
    assert!(batch.is_err());
}

#[tokio::test]
async fn test_mockSynthesizer_withTruncatedBehavior_shouldWriteEmptyClip() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("speech_1.wav");
    let synthesizer = MockSynthesizer::new(MockBehavior::Truncated).with_sample_rate(TEST_SAMPLE_RATE);

    let render = synthesizer.synthesize("Hello", &path).await?;

    assert_eq!(render.duration, 0.0);
    assert_eq!(media::wav_duration(&path)?, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_mockSynthesizer_failing_shouldNotWriteFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("speech_1.wav");

    let result = MockSynthesizer::failing().synthesize("Hello", &path).await;

    assert!(matches!(result, Err(ProviderError::ApiError { status_code: 500, .. })));
    assert!(!path.exists());
    Ok(())
}
