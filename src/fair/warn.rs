use crate::error::FairWarnCode;

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn format_line(code: FairWarnCode, stage: &str, source: &str, reason: &str, err: &str) -> String {
    format!(
        "FAIR_WARN code={} stage={} source={} reason={} err={}",
        code.as_str(),
        sanitize_value(stage),
        sanitize_value(source),
        sanitize_value(reason),
        sanitize_value(err),
    )
}

pub fn emit(code: FairWarnCode, stage: &str, source: &str, reason: &str, err: &str) {
    log::warn!("{}", format_line(code, stage, source, reason, err));
}
