/// Two-letter locale prefix to document language code.
pub const LOCALE_MAP: [(&str, &str); 14] = [
    ("sk", "slo"),
    ("cs", "cze"),
    ("en", "eng"),
    ("de", "deu"),
    ("nl", "nld"),
    ("hr", "hrv"),
    ("hu", "hun"),
    ("pl", "pol"),
    ("ro", "rom"),
    ("ru", "rus"),
    ("sl", "slv"),
    ("es", "spa"),
    ("it", "ita"),
    ("uk", "ukr"),
];

pub fn map_locale(locale: &str) -> Option<&'static str> {
    LOCALE_MAP
        .iter()
        .find(|(prefix, _)| *prefix == locale)
        .map(|(_, code)| *code)
}
