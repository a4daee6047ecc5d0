use crate::config::{Mode, Options};
use crate::style::{Layer, Scope, StyleSheet};
use log::{trace, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub emitted_token: Option<String>,
    pub ignored: Vec<String>,
    pub style_sheet: StyleSheet,
}

impl Resolution {
    pub fn replacement_text(&self) -> String {
        self.emitted_token
            .iter()
            .chain(self.ignored.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait UtilityResolver {
    fn compile(&self, classes: &str, prefix: &str) -> Resolution;

    fn interpret(&self, classes: &str) -> Resolution;

    fn preflight(&self, tags: &[String], include_global: bool) -> StyleSheet;
}

impl<R: UtilityResolver + ?Sized> UtilityResolver for &R {
    fn compile(&self, classes: &str, prefix: &str) -> Resolution {
        (**self).compile(classes, prefix)
    }

    fn interpret(&self, classes: &str) -> Resolution {
        (**self).interpret(classes)
    }

    fn preflight(&self, tags: &[String], include_global: bool) -> StyleSheet {
        (**self).preflight(tags, include_global)
    }
}

pub struct ResolverAdapter<'a, R: ?Sized> {
    resolver: &'a R,
    options: &'a Options,
}

impl<'a, R: UtilityResolver + ?Sized> ResolverAdapter<'a, R> {
    pub fn new(resolver: &'a R, options: &'a Options) -> Self {
        Self { resolver, options }
    }

    pub fn mode(&self) -> Mode {
        self.options.mode
    }

    pub fn resolve_attribute(&self, classes: &str) -> Resolution {
        let resolution = match self.options.mode {
            Mode::Rewrite => {
                let mut resolution = self.resolver.compile(classes, &self.options.prefix);
                resolution.style_sheet = resolution.style_sheet.with_layer(Layer::Utility);
                resolution
            }
            Mode::ResolveInPlace => {
                let mut resolution = self.resolver.interpret(classes);
                resolution.emitted_token = None;
                resolution.style_sheet = resolution
                    .style_sheet
                    .with_scope(Scope::DeferredGlobal)
                    .with_layer(Layer::Utility);
                resolution
            }
        };
        trace!(
            "resolved attribute '{}' ({}): {} rules, {} ignored",
            classes,
            self.options.mode,
            resolution.style_sheet.len(),
            resolution.ignored.len()
        );
        checked(classes, resolution)
    }

    /// Resolves class directives and conditional branches. These always
    /// resolve in place, whatever the session mode.
    pub fn resolve_directive(&self, classes: &str) -> Resolution {
        let mut resolution = self.resolver.interpret(classes);
        resolution.emitted_token = None;
        resolution.style_sheet = resolution.style_sheet.with_layer(Layer::Directive);
        trace!(
            "resolved directive '{}': {} rules, {} ignored",
            classes,
            resolution.style_sheet.len(),
            resolution.ignored.len()
        );
        checked(classes, resolution)
    }

    pub fn preflight(&self, tags: &[String], include_global: bool) -> StyleSheet {
        self.resolver
            .preflight(tags, include_global)
            .with_scope(Scope::Global)
            .with_layer(Layer::Preflight)
    }
}

fn checked(classes: &str, mut resolution: Resolution) -> Resolution {
    let tokens = classes.split_whitespace().collect::<Vec<_>>();
    resolution.ignored.retain(|ignored| {
        let known = tokens.contains(&ignored.as_str());
        if !known {
            warn!(
                "resolver reported '{}' as ignored, but it is not in '{}'",
                ignored, classes
            );
        }
        known
    });
    resolution
}
