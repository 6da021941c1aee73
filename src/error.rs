use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    ResolveError,
    RuntimeError,
}

#[derive(Debug, Clone)]
pub struct SprigError {
    pub kind: ErrorKind,
    pub span: Span,
    pub line: usize,
    pub message: String,
    pub help: Option<String>,
}

impl SprigError {
    pub fn new(kind: ErrorKind, span: Span, line: usize, message: String) -> Self {
        Self {
            kind,
            span,
            line,
            message,
            help: None,
        }
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn lex_error(span: Span, line: usize, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, line, message)
    }

    pub fn parse_error(span: Span, line: usize, message: String) -> Self {
        Self::new(ErrorKind::ParseError, span, line, message)
    }

    pub fn resolve_error(span: Span, line: usize, message: String) -> Self {
        Self::new(ErrorKind::ResolveError, span, line, message)
    }

    pub fn runtime_error(span: Span, line: usize, message: String) -> Self {
        Self::new(ErrorKind::RuntimeError, span, line, message)
    }

    pub fn is_static(&self) -> bool {
        self.kind != ErrorKind::RuntimeError
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");

        let color = match self.kind {
            ErrorKind::LexError => Color::Red,
            ErrorKind::ParseError => Color::Yellow,
            ErrorKind::ResolveError => Color::Yellow,
            ErrorKind::RuntimeError => Color::Magenta,
        };

        let kind_str = match self.kind {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::ParseError => "Parse Error",
            ErrorKind::ResolveError => "Resolve Error",
            ErrorKind::RuntimeError => "Runtime Error",
        };

        // Spans are byte offsets; an EOF-adjacent span can point one past
        // the end of the source, which ariadne rejects.
        let end = self.span.end.min(source.len().max(1));
        let start = self.span.start.min(end.saturating_sub(1));

        let mut builder = Report::build(ReportKind::Error, filename, start)
            .with_message(format!("{}: {}", kind_str.fg(color), self.message))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            builder = builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        builder
            .finish()
            .print((filename, Source::from(source)))
            .unwrap();
    }
}

impl fmt::Display for SprigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[line {}] {}", self.line, self.message)
    }
}

impl std::error::Error for SprigError {}
