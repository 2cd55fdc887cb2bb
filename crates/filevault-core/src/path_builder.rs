//! Storage path building
//!
//! Paths are rendered from templates such as
//! `{model}{ds}{collection}{ds}{randomPath}{ds}{strippedId}{ds}{filename}.{extension}`.
//! Templates are compiled once into literal and token segments; rendering is pure and
//! deterministic for a given file (and variant).
//!
//! Supported tokens:
//!
//! | Token | Value |
//! |---|---|
//! | `{model}`, `{collection}`, `{modelId}` | ownership tags, empty when unset |
//! | `{ds}` | path separator |
//! | `{id}` | file uuid |
//! | `{strippedId}` | uuid without dashes |
//! | `{randomPath}` | nested two-character directories taken from the stripped id |
//! | `{filename}` | sanitized filename without extension |
//! | `{basename}` | sanitized filename with extension |
//! | `{extension}` | lower-cased extension |
//! | `{hashedVariant}` | 8 hex chars identifying the variant's operations |
//! | `{variant}` | variant name |

use crate::error::{Error, Result};
use crate::file::File;
use crate::sanitizer::{FilenameSanitizer, NoopSanitizer, SanitizerOptions, UrlSafeSanitizer};
use crate::variant::{hash_operations, VariantRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_PATH_TEMPLATE: &str =
    "{model}{ds}{collection}{ds}{randomPath}{ds}{strippedId}{ds}{filename}.{extension}";
pub const DEFAULT_VARIANT_PATH_TEMPLATE: &str =
    "{model}{ds}{collection}{ds}{randomPath}{ds}{strippedId}{ds}{filename}.{hashedVariant}.{extension}";

/// Computes where a file and its variants live inside a storage adapter
pub trait PathBuilder: Send + Sync {
    fn path(&self, file: &File) -> String;

    /// Path of a declared variant; fails with `VariantNotFound` for any other name
    fn path_for_variant(&self, file: &File, variant: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Model,
    Collection,
    ModelId,
    Ds,
    Id,
    StrippedId,
    RandomPath,
    Filename,
    Basename,
    Extension,
    HashedVariant,
    Variant,
}

impl Token {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "model" => Token::Model,
            "collection" => Token::Collection,
            "modelId" => Token::ModelId,
            "ds" => Token::Ds,
            "id" => Token::Id,
            "strippedId" => Token::StrippedId,
            "randomPath" => Token::RandomPath,
            "filename" => Token::Filename,
            "basename" => Token::Basename,
            "extension" => Token::Extension,
            "hashedVariant" => Token::HashedVariant,
            "variant" => Token::Variant,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// A compiled path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices();

        while let Some((start, c)) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }
            let mut name = String::new();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                return Err(Error::InvalidTemplate(format!(
                    "unterminated `{{` at offset {} in `{}`",
                    start, template
                )));
            }
            let token = Token::parse(&name).ok_or_else(|| {
                Error::InvalidTemplate(format!("unknown token `{{{}}}` in `{}`", name, template))
            })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(token));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn uses(&self, token: Token) -> bool {
        self.segments.contains(&Segment::Token(token))
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn default_separator() -> String {
    std::path::MAIN_SEPARATOR.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    pub path_template: String,
    pub variant_path_template: String,
    pub random_path_levels: usize,
    /// Value of `{ds}`
    pub separator: String,
    /// Run filenames through the URL-safe sanitizer
    pub sanitize: bool,
    pub sanitizer: SanitizerOptions,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
            variant_path_template: DEFAULT_VARIANT_PATH_TEMPLATE.to_string(),
            random_path_levels: 1,
            separator: default_separator(),
            sanitize: true,
            sanitizer: SanitizerOptions::default(),
        }
    }
}

/// Template based [`PathBuilder`]
#[derive(Clone)]
pub struct TemplatePathBuilder {
    path_template: PathTemplate,
    variant_path_template: PathTemplate,
    random_path_levels: usize,
    separator: String,
    sanitizer: Arc<dyn FilenameSanitizer>,
}

impl fmt::Debug for TemplatePathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplatePathBuilder")
            .field("path_template", &self.path_template.as_str())
            .field("variant_path_template", &self.variant_path_template.as_str())
            .field("random_path_levels", &self.random_path_levels)
            .field("separator", &self.separator)
            .finish()
    }
}

impl TemplatePathBuilder {
    /// Compile both templates; fails with `InvalidTemplate`.
    ///
    /// The variant template must contain `{hashedVariant}` or `{variant}`, otherwise
    /// every variant would be written over the same path.
    pub fn new(options: PathOptions) -> Result<Self> {
        if options.separator.is_empty() {
            return Err(Error::InvalidTemplate(
                "path separator must not be empty".to_string(),
            ));
        }
        let variant_path_template = PathTemplate::parse(&options.variant_path_template)?;
        if !variant_path_template.uses(Token::HashedVariant)
            && !variant_path_template.uses(Token::Variant)
        {
            return Err(Error::InvalidTemplate(format!(
                "variant template `{}` needs {{hashedVariant}} or {{variant}}",
                variant_path_template
            )));
        }
        let sanitizer: Arc<dyn FilenameSanitizer> = if options.sanitize {
            Arc::new(UrlSafeSanitizer::new(options.sanitizer))
        } else {
            Arc::new(NoopSanitizer)
        };
        Ok(Self {
            path_template: PathTemplate::parse(&options.path_template)?,
            variant_path_template,
            random_path_levels: options.random_path_levels,
            separator: options.separator,
            sanitizer,
        })
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn FilenameSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn path_template(&self) -> &PathTemplate {
        &self.path_template
    }

    pub fn variant_path_template(&self) -> &PathTemplate {
        &self.variant_path_template
    }

    fn random_path(&self, stripped_id: &str) -> String {
        let chars: Vec<char> = stripped_id.chars().collect();
        chars
            .chunks(2)
            .take(self.random_path_levels)
            .map(|pair| pair.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    fn render(
        &self,
        template: &PathTemplate,
        file: &File,
        variant: Option<(&str, &VariantRecord)>,
    ) -> String {
        let stripped_id = file.uuid().replace('-', "");
        let basename = if template.uses(Token::Filename) || template.uses(Token::Basename) {
            self.sanitizer.sanitize(file.filename())
        } else {
            String::new()
        };
        let filename = match basename.rfind('.') {
            Some(i) if i > 0 && file.extension().is_some() => &basename[..i],
            _ => basename.as_str(),
        };

        let mut out = String::new();
        for segment in &template.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(token) => match token {
                    Token::Model => out.push_str(file.model().unwrap_or_default()),
                    Token::Collection => out.push_str(file.collection().unwrap_or_default()),
                    Token::ModelId => out.push_str(file.model_id().unwrap_or_default()),
                    Token::Ds => out.push_str(&self.separator),
                    Token::Id => out.push_str(file.uuid()),
                    Token::StrippedId => out.push_str(&stripped_id),
                    Token::RandomPath => out.push_str(&self.random_path(&stripped_id)),
                    Token::Filename => out.push_str(filename),
                    Token::Basename => out.push_str(&basename),
                    Token::Extension => out.push_str(file.extension().unwrap_or_default()),
                    Token::HashedVariant => {
                        if let Some((_, record)) = variant {
                            out.push_str(&hash_operations(&record.operations));
                        }
                    }
                    Token::Variant => {
                        if let Some((name, _)) = variant {
                            out.push_str(name);
                        }
                    }
                },
            }
        }

        self.normalize(&out)
    }

    /// Drop empty segments and the dots left behind by empty tokens
    fn normalize(&self, path: &str) -> String {
        path.split(self.separator.as_str())
            .map(|segment| {
                let mut collapsed = String::with_capacity(segment.len());
                for c in segment.chars() {
                    if c == '.' && collapsed.ends_with('.') {
                        continue;
                    }
                    collapsed.push(c);
                }
                collapsed.trim_end_matches('.').to_string()
            })
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

impl PathBuilder for TemplatePathBuilder {
    fn path(&self, file: &File) -> String {
        self.render(&self.path_template, file, None)
    }

    fn path_for_variant(&self, file: &File, variant: &str) -> Result<String> {
        let record = file.variant(variant)?;
        Ok(self.render(&self.variant_path_template, file, Some((variant, record))))
    }
}

/// Predicate deciding whether a conditional builder applies to a file
pub type PathPredicate = Box<dyn Fn(&File) -> bool + Send + Sync>;

/// Picks a builder per file: the first matching predicate wins, otherwise the default
pub struct ConditionalPathBuilder {
    builders: Vec<(PathPredicate, Arc<dyn PathBuilder>)>,
    default: Arc<dyn PathBuilder>,
}

impl ConditionalPathBuilder {
    pub fn new(default: Arc<dyn PathBuilder>) -> Self {
        Self {
            builders: Vec::new(),
            default,
        }
    }

    pub fn add_builder(
        mut self,
        predicate: impl Fn(&File) -> bool + Send + Sync + 'static,
        builder: Arc<dyn PathBuilder>,
    ) -> Self {
        self.builders.push((Box::new(predicate), builder));
        self
    }

    fn select(&self, file: &File) -> &dyn PathBuilder {
        self.builders
            .iter()
            .find(|(predicate, _)| predicate(file))
            .map(|(_, builder)| builder.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}

impl PathBuilder for ConditionalPathBuilder {
    fn path(&self, file: &File) -> String {
        self.select(file).path(file)
    }

    fn path_for_variant(&self, file: &File, variant: &str) -> Result<String> {
        self.select(file).path_for_variant(file, variant)
    }
}
