//! Template set: named SQL fragments compiled with handlebars.
//!
//! A template document declares fragments as inline blocks:
//!
//! ```text
//! {{#*inline "selectByClass"}}
//!   SELECT name, class FROM ${table} WHERE class = #{class}
//! {{/inline}}
//! ```
//!
//! Anything outside of a block is ignored. Each fragment is registered as its
//! own template, so fragments can include one another as partials.

use std::{
    collections::HashSet,
    fs,
    path::Path,
    sync::OnceLock,
    time::Duration,
};

use handlebars::{
    no_escape, Context as RenderData, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderErrorReason,
};
use regex::Regex;
use sqlp_config::{Config, Placeholder};
use tracing::debug;

use crate::{
    error::{Result, SqlpError},
    executor::Executor,
    expand::Mode,
    loader::Loader,
    value::Record,
};

/// Compiled fragments plus the options every executor inherits.
///
/// Immutable after construction; share it freely between threads.
pub struct Mapper {
    registry: Handlebars<'static>,
    names: Vec<String>,
    placeholder: Placeholder,
    log_statements: bool,
    query_timeout: Option<Duration>,
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("names", &self.names)
            .field("placeholder", &self.placeholder)
            .field("log_statements", &self.log_statements)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

fn fragment_pattern() -> &'static Regex {
    static FRAGMENT_RE: OnceLock<Regex> = OnceLock::new();
    FRAGMENT_RE.get_or_init(|| {
        Regex::new(r#"(?s)\{\{~?#\*inline\s+"([^"]+)"\s*~?\}\}(.*?)\{\{~?/inline\s*~?\}\}"#)
            .unwrap()
    })
}

impl Mapper {
    fn empty(config: &Config) -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);
        registry.set_strict_mode(config.is_strict());
        registry.register_helper("plus", Box::new(plus_helper));
        registry.register_helper("trim", Box::new(trim_helper));
        registry.register_helper("join", Box::new(join_helper));

        Self {
            registry,
            names: Vec::new(),
            placeholder: config.placeholder(),
            log_statements: config.logs_statements(),
            query_timeout: config.query_timeout(),
        }
    }

    /// Compiles a single in-memory document with default options.
    pub fn parse_str(source: &str) -> Result<Self> {
        let mut mapper = Self::empty(&Config::default_config());
        mapper.add_document("<memory>", source)?;
        Ok(mapper)
    }

    /// Compiles a single document read from `path` with default options.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let mut mapper = Self::empty(&Config::default_config());
        mapper.add_document(&path.display().to_string(), &source)?;
        Ok(mapper)
    }

    /// Compiles every named document obtained from `loader`, with default
    /// options.
    pub fn parse_with<L, I, S>(loader: &L, names: I) -> Result<Self>
    where
        L: Loader + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(&Config::default_config(), loader, names)
    }

    /// Loads the configuration from `$SQLP_CONFIG` or `./sqlp.toml` (see
    /// [`Config::new`]) and compiles the documents it lists.
    pub fn load<L: Loader + ?Sized>(loader: &L) -> Result<Self> {
        let config = Config::new()?;
        Self::from_config(&config, loader)
    }

    /// Compiles the documents listed in `config.templates` and applies the
    /// configured options.
    pub fn from_config<L: Loader + ?Sized>(config: &Config, loader: &L) -> Result<Self> {
        Self::build(config, loader, &config.templates)
    }

    fn build<L, I, S>(config: &Config, loader: &L, names: I) -> Result<Self>
    where
        L: Loader + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mapper = Self::empty(config);
        for name in names {
            let name = name.as_ref();
            let source = loader.load(name)?;
            mapper.add_document(name, &source)?;
        }
        Ok(mapper)
    }

    fn add_document(&mut self, document: &str, source: &str) -> Result<()> {
        // Syntax errors outside the inline blocks would otherwise go unnoticed.
        handlebars::Template::compile(source)
            .map_err(|err| SqlpError::Compile(format!("{document}: {err}")))?;

        let mut seen: HashSet<&str> = self.names.iter().map(String::as_str).collect();
        let mut fragments = Vec::new();

        for caps in fragment_pattern().captures_iter(source) {
            let (_, [name, body]) = caps.extract();
            if !seen.insert(name) {
                return Err(SqlpError::Compile(format!(
                    "duplicate fragment '{name}' in {document}"
                )));
            }
            fragments.push((name, body.trim()));
        }

        if fragments.is_empty() {
            return Err(SqlpError::Compile(format!(
                "no fragments declared in {document}"
            )));
        }

        for (name, body) in &fragments {
            self.registry
                .register_template_string(name, body)
                .map_err(|err| SqlpError::Compile(format!("{document}: {err}")))?;
        }
        self.names
            .extend(fragments.iter().map(|(name, _)| name.to_string()));

        debug!(
            document,
            fragments = fragments.len(),
            "compiled template document"
        );
        Ok(())
    }

    /// Returns an executor for the named fragment. The name is checked when
    /// the executor renders.
    pub fn fragment<'t>(&self, name: &str) -> Executor<'_, 't> {
        Executor::new(self, name)
    }

    /// Renders a fragment without expanding its markers.
    pub fn render(&self, name: &str, mode: Mode, records: &[Record]) -> Result<String> {
        if !self.contains(name) {
            return Err(SqlpError::UnknownFragment(name.to_string()));
        }

        let rendered = match (mode, records.first()) {
            (Mode::Normal, Some(record)) => self.registry.render(name, record)?,
            (Mode::Normal, None) => self.registry.render(name, &serde_json::Map::new())?,
            (Mode::Batch, _) => self.registry.render(name, &records)?,
        };
        Ok(rendered)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    /// Fragment names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    pub(crate) fn logs_statements(&self) -> bool {
        self.log_statements
    }

    pub(crate) fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }
}

fn param_i64(h: &Helper, index: usize) -> std::result::Result<i64, RenderErrorReason> {
    h.param(index)
        .and_then(|p| p.value().as_i64())
        .ok_or_else(|| {
            RenderErrorReason::Other(format!(
                "{}: parameter {index} must be an integer",
                h.name()
            ))
        })
}

fn param_str<'a>(h: &'a Helper, index: usize) -> std::result::Result<&'a str, RenderErrorReason> {
    h.param(index)
        .and_then(|p| p.value().as_str())
        .ok_or_else(|| {
            RenderErrorReason::Other(format!(
                "{}: parameter {index} must be a string",
                h.name()
            ))
        })
}

/// `{{plus a b}}`: integer addition.
fn plus_helper(
    h: &Helper,
    _: &Handlebars,
    _: &RenderData,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let sum = param_i64(h, 0)?.wrapping_add(param_i64(h, 1)?);
    out.write(&sum.to_string())?;
    Ok(())
}

/// `{{trim s ","}}`: strips trailing spaces and the given character.
fn trim_helper(
    h: &Helper,
    _: &Handlebars,
    _: &RenderData,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let text = param_str(h, 0)?;
    let cutset = param_str(h, 1)?.chars().next().unwrap_or(' ');
    out.write(trim_right(text, cutset))?;
    Ok(())
}

/// `{{join sep a b}}`: joins two strings, or passes through the non-empty one.
fn join_helper(
    h: &Helper,
    _: &Handlebars,
    _: &RenderData,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let joined = join(param_str(h, 0)?, param_str(h, 1)?, param_str(h, 2)?);
    out.write(&joined)?;
    Ok(())
}

fn trim_right(text: &str, cutset: char) -> &str {
    text.trim_end_matches(|c: char| c == ' ' || c == cutset)
}

fn join(sep: &str, a: &str, b: &str) -> String {
    if a.is_empty() {
        return b.to_string();
    }
    if b.is_empty() {
        return a.to_string();
    }
    format!("{a}{sep}{b}")
}
