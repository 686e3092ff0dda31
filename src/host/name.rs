use crate::host::TraceContext;

/// Maps an invocation's runtime attributes plus a resource template into
/// the final metric name used as the registry key.
pub trait NameFormatter: Send + Sync {
    fn format(&self, resource: &str, ctx: &TraceContext) -> String;
}

/// Default formatter: `{attribute}` tokens in the resource template are
/// replaced with the invocation's attribute values (empty when absent),
/// then pipe runs left by empty substitutions are cleaned up.
#[derive(Debug, Default)]
pub struct TemplateNameFormatter;

impl NameFormatter for TemplateNameFormatter {
    fn format(&self, resource: &str, ctx: &TraceContext) -> String {
        let mut out = String::with_capacity(resource.len());
        let mut rest = resource;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            match rest[open..].find('}') {
                Some(close) => {
                    let token = &rest[open + 1..open + close];
                    if let Some(value) = ctx.attribute(token) {
                        out.push_str(value);
                    }
                    rest = &rest[open + close + 1..];
                }
                None => {
                    // Unterminated token: keep the remainder verbatim.
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        collapse_pipes(&out)
    }
}

/// Remove every `{…}` token from a resource template.
pub(crate) fn strip_templates(resource: &str) -> String {
    let mut out = String::with_capacity(resource.len());
    let mut rest = resource;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Collapse runs of `|` segment separators and trim a trailing one.
pub(crate) fn collapse_pipes(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_pipe = false;
    for c in name.chars() {
        if c == '|' {
            if prev_pipe {
                continue;
            }
            prev_pipe = true;
        } else {
            prev_pipe = false;
        }
        out.push(c);
    }
    if out.ends_with('|') {
        out.pop();
    }
    out
}
