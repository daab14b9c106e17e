//! Per-language demo sentences.
//!
//! Voice identifiers follow the `{language-code}-{name}` convention
//! (`en-narrator`, `fr-marie`, …).  The code before the first `-` selects the
//! demo sentence; anything unrecognised falls back to English.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Language code used when a voice identifier has no recognised prefix.
pub const DEFAULT_LANGUAGE: &str = "en";

static LANGUAGE_TEXTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("en", "This is a demo of the VibeVoice realtime streaming text to speech model with fifteen inference steps."),
        ("fr", "Ceci est une démonstration du modèle VibeVoice de synthèse vocale en temps réel avec quinze étapes d'inférence."),
        ("sp", "Esta es una demostración del modelo VibeVoice de síntesis de voz en tiempo real con quince pasos de inferencia."),
        ("de", "Dies ist eine Demo des VibeVoice-Echtzeit-Text-zu-Sprache-Modells mit fünfzehn Inferenzschritten."),
        ("it", "Questa è una dimostrazione del modello VibeVoice di sintesi vocale in tempo reale con quindici passaggi di inferenza."),
        ("jp", "これは、15個の推論ステップを備えたVibeVoiceリアルタイム・テキスト読み上げモデルのデモです。"),
        ("kr", "이것은 15단계 추론을 갖춘 VibeVoice 실시간 텍스트 음성 변환 모델의 데모입니다."),
        ("nl", "Dit is een demo van het VibeVoice real-time tekst-naar-spraak model met vijftien inferentiestappen."),
        ("pl", "To jest demo modelu VibeVoice do syntezy mowy w czasie rzeczywistym z piętnastoma krokami inferencji."),
        ("pt", "Esta é uma demonstração do modelo VibeVoice de síntese de voz em tempo real com quinze passos de inferência."),
        ("in", "Ini adalah demo model VibeVoice teks-ke-ucapan real-time dengan lima belas langkah inferensi."),
    ])
});

/// Language code of a voice identifier: the part before the first `-`,
/// lower-cased.  An identifier without a separator is treated as a code on
/// its own (it will simply miss the table and fall back to English).
pub fn language_code(voice: &str) -> String {
    voice
        .split('-')
        .next()
        .unwrap_or(voice)
        .to_ascii_lowercase()
}

/// Demo sentence for a voice identifier.  Total over all inputs.
pub fn demo_text(voice: &str) -> &'static str {
    let code = language_code(voice);
    LANGUAGE_TEXTS
        .get(code.as_str())
        .copied()
        .unwrap_or_else(|| LANGUAGE_TEXTS[DEFAULT_LANGUAGE])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_prefix_selects_language() {
        assert!(demo_text("fr-voice1").starts_with("Ceci est une démonstration"));
        assert!(demo_text("de-anna").starts_with("Dies ist eine Demo"));
        assert!(demo_text("jp-akira").contains("VibeVoice"));
    }

    #[test]
    fn test_unknown_prefix_falls_back_to_english() {
        assert_eq!(demo_text("xx-voice2"), demo_text("en-whatever"));
        assert!(demo_text("xx-voice2").starts_with("This is a demo"));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        assert_eq!(demo_text("FR-Marie"), demo_text("fr-marie"));
    }

    #[test]
    fn test_no_separator_is_total() {
        // whole identifier treated as a code; "en" hits, anything else misses
        assert!(demo_text("en").starts_with("This is a demo"));
        assert!(demo_text("narrator").starts_with("This is a demo"));
        assert!(demo_text("").starts_with("This is a demo"));
    }

    #[test]
    fn test_only_first_separator_counts() {
        assert!(demo_text("pt-br-joao").starts_with("Esta é uma demonstração"));
    }
}
