//! Persona configuration and the deterministic system-prompt mapping.
//!
//! Each persona field maps to exactly one instruction fragment; the whole
//! preamble is a pure function of the four fields so the gateway and tests
//! agree byte-for-byte. Unrecognized wire values fall back to the defaults
//! (friendly / calm / fusha / tutor off).

use serde::{Deserialize, Serialize};

/// Writing style for the assistant's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Formal,
    #[default]
    Friendly,
    Concise,
    Colloquial,
}

impl Style {
    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            s if s.eq_ignore_ascii_case("formal") => Style::Formal,
            s if s.eq_ignore_ascii_case("concise") => Style::Concise,
            s if s.eq_ignore_ascii_case("colloquial") => Style::Colloquial,
            _ => Style::Friendly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Formal => "formal",
            Style::Friendly => "friendly",
            Style::Concise => "concise",
            Style::Colloquial => "colloquial",
        }
    }
}

/// Emotional register of the replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Calm,
    Cheerful,
    Pro,
}

impl Tone {
    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            s if s.eq_ignore_ascii_case("cheerful") => Tone::Cheerful,
            s if s.eq_ignore_ascii_case("pro") => Tone::Pro,
            _ => Tone::Calm,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Calm => "calm",
            Tone::Cheerful => "cheerful",
            Tone::Pro => "pro",
        }
    }
}

/// Reply language: Modern Standard Arabic, Gulf colloquial, English, or mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Fusha,
    Ammiyah,
    English,
    Mixed,
}

impl Lang {
    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            s if s.eq_ignore_ascii_case("ammiyah") => Lang::Ammiyah,
            s if s.eq_ignore_ascii_case("english") => Lang::English,
            s if s.eq_ignore_ascii_case("mixed") => Lang::Mixed,
            _ => Lang::Fusha,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Fusha => "fusha",
            Lang::Ammiyah => "ammiyah",
            Lang::English => "english",
            Lang::Mixed => "mixed",
        }
    }
}

/// The active persona configuration. Exactly one is active process-wide; it
/// lives in [`crate::prefs::Preferences`] and is sent with every chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub lang: Lang,
    /// When on, replies to English input include gentle correction feedback.
    #[serde(default)]
    pub tutor: bool,
}

/// Loosely-typed persona as it arrives on the wire. Absent or unrecognized
/// fields default rather than failing the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaWire {
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub tutor: Option<bool>,
}

impl Persona {
    pub fn from_wire(wire: &PersonaWire) -> Self {
        Self {
            style: wire.style.as_deref().map(Style::from_str).unwrap_or_default(),
            tone: wire.tone.as_deref().map(Tone::from_str).unwrap_or_default(),
            lang: wire.lang.as_deref().map(Lang::from_str).unwrap_or_default(),
            tutor: wire.tutor.unwrap_or(false),
        }
    }
}

fn lang_rule(lang: Lang) -> &'static str {
    match lang {
        Lang::Fusha => "اكتبي دائمًا بالعربية الفصحى.",
        Lang::Ammiyah => "اكتبي بالعربية العامية بلطف وبأسلوب خليجي خفيف دون مبالغة.",
        Lang::English => "Always respond in natural, clear English.",
        Lang::Mixed => "اكتبي بالعربية، ولا مانع من مزج الإنجليزية عند الحاجة بشكل طبيعي.",
    }
}

fn style_rule(style: Style) -> &'static str {
    match style {
        Style::Formal => "أسلوب رسمي راقٍ، مختصر وواضح.",
        Style::Friendly => "أسلوب ودود جدًا، لطيف، مختصر وواضح.",
        Style::Concise => "اختصري قدر الإمكان مع وضوح تام ونقاط مرتبة.",
        Style::Colloquial => "أسلوب محادثي قريب وسلس دون إسهاب.",
    }
}

fn tone_rule(tone: Tone) -> &'static str {
    match tone {
        Tone::Calm => "نبرة هادئة مطمئنة.",
        Tone::Cheerful => "نبرة مرِحة خفيفة دون مبالغة.",
        Tone::Pro => "نبرة احترافية رزينة.",
    }
}

fn tutor_rule(tutor: bool) -> &'static str {
    if tutor {
        "عند كتابة المستخدم بالإنجليزية:\n\
         - قدّمي تصحيحًا لطيفًا بعنوان \"تصحيح مقترح\".\n\
         - أعطي مثالين بديلين مختصرين.\n\
         - وعند الطلب فقط، قدّمي تمرينًا قصيرًا من سطرين."
    } else {
        "لا تقدّمي تصحيحًا تفصيليًا ما لم يُطلب ذلك."
    }
}

const FIXED_RULES: &str = "- نادي المستخدم دائمًا بـ \"مامي\".\n\
- تجنّبي الإيموجي إلا نادرًا.\n\
- احترمي الخصوصية ولا تطلبي بيانات حساسة.\n\
- عند الكود: قدّمي الشفرة نظيفة ومباشرة مع شرح سطرين فقط عند اللزوم.";

/// Builds the instruction preamble sent as the system turn. Deterministic in
/// the four persona fields.
pub fn system_prompt(persona: &Persona) -> String {
    format!(
        "أنتِ Lilly — سكرتيرة شخصية لمامي.\n\
         هدفك إرضاؤها وتقديم أفضل مساعدة ممكنة.\n\n\
         {}\n{}\n{}\n{}\n{}",
        lang_rule(persona.lang),
        style_rule(persona.style),
        tone_rule(persona.tone),
        tutor_rule(persona.tutor),
        FIXED_RULES
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_parse_fallbacks() {
        assert_eq!(Style::from_str("formal"), Style::Formal);
        assert_eq!(Style::from_str("FORMAL"), Style::Formal);
        assert_eq!(Style::from_str("nonsense"), Style::Friendly);
        assert_eq!(Tone::from_str(""), Tone::Calm);
        assert_eq!(Lang::from_str("english"), Lang::English);
        assert_eq!(Lang::from_str("klingon"), Lang::Fusha);
    }

    #[test]
    fn test_wire_defaults() {
        let persona = Persona::from_wire(&PersonaWire::default());
        assert_eq!(persona, Persona::default());
        assert_eq!(persona.style, Style::Friendly);
        assert_eq!(persona.tone, Tone::Calm);
        assert_eq!(persona.lang, Lang::Fusha);
        assert!(!persona.tutor);
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let persona = Persona {
            style: Style::Concise,
            tone: Tone::Pro,
            lang: Lang::Mixed,
            tutor: true,
        };
        assert_eq!(system_prompt(&persona), system_prompt(&persona));
        // A different persona produces a different preamble.
        assert_ne!(system_prompt(&persona), system_prompt(&Persona::default()));
    }

    #[test]
    fn test_prompt_reflects_fields() {
        let english = Persona {
            lang: Lang::English,
            ..Persona::default()
        };
        assert!(system_prompt(&english).contains("Always respond in natural, clear English."));

        let tutor = Persona {
            tutor: true,
            ..Persona::default()
        };
        assert!(system_prompt(&tutor).contains("تصحيح مقترح"));
        assert!(!system_prompt(&Persona::default()).contains("تصحيح مقترح"));
    }
}
