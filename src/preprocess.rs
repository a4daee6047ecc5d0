use crate::config::Mode;
use crate::error::PreprocessError;
use crate::markup::{ComponentParser, MarkupParser};
use crate::resolver::{ResolverAdapter, UtilityResolver};
use crate::scanner::{Scanner, TransformBuffer};
use crate::session::Session;
use crate::splice::{Splice, inject_styles};
use crate::style::{DeferredScope, StyleSheet};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInput<'a> {
    pub source: &'a str,
    pub filename: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub code: String,
    pub css: String,
    pub ignored: Vec<String>,
    pub new_tags: Vec<String>,
    pub preflight_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Preprocessor<R, P = MarkupParser> {
    resolver: R,
    parser: P,
}

impl<R: UtilityResolver> Preprocessor<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            parser: MarkupParser,
        }
    }
}

impl<R: UtilityResolver, P: ComponentParser> Preprocessor<R, P> {
    pub fn with_parser(resolver: R, parser: P) -> Self {
        Self { resolver, parser }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Processes one file. On error the session is left untouched.
    pub fn process(
        &self,
        session: &mut Session,
        input: SourceInput<'_>,
    ) -> Result<Processed, PreprocessError> {
        let SourceInput { source, filename } = input;
        debug!(
            "preprocessing {} ({:?})",
            filename,
            session.file_state(filename)
        );

        let component = self.parser.parse(source)?;
        let TransformBuffer {
            utilities,
            directives,
            ignored,
            new_tags,
            edits,
        } = Scanner::new(&self.resolver, session).scan(&component)?;

        let mut preflight_tags = new_tags.clone();
        if session.has_seen(filename) {
            for tag in session.tags_introduced_by(filename) {
                if !preflight_tags.iter().any(|known| known == tag) {
                    preflight_tags.push(tag.to_string());
                }
            }
        }
        let include_global = session.includes_global_baseline(filename);
        let preflight = ResolverAdapter::new(&self.resolver, session.options())
            .preflight(&preflight_tags, include_global);
        debug!(
            "{}: {} preflight tags (global baseline: {}), {} utility and {} directive fragments",
            filename,
            preflight_tags.len(),
            include_global,
            utilities.len(),
            directives.len()
        );

        let css = assemble(preflight, utilities, directives, session.options().mode);

        let mut splice = Splice::new(source);
        for edit in edits {
            splice.overwrite(edit.range, edit.replacement);
        }
        inject_styles(&mut splice, &component.styles, &css);
        let code = splice.finish()?;

        session.commit(filename, &new_tags);
        if !ignored.is_empty() {
            debug!("{}: ignored classes {}", filename, ignored.join(" "));
        }
        Ok(Processed {
            code,
            css,
            ignored,
            new_tags,
            preflight_tags,
        })
    }
}

pub fn assemble(
    preflight: StyleSheet,
    utilities: Vec<StyleSheet>,
    directives: Vec<StyleSheet>,
    mode: Mode,
) -> String {
    let deferred = match mode {
        Mode::ResolveInPlace => DeferredScope::Global,
        Mode::Rewrite => DeferredScope::Local,
    };
    preflight
        .extend(utilities.into_iter().collect())
        .extend(directives.into_iter().collect())
        .combine()
        .sort()
        .build(deferred)
}

#[cfg(test)]
mod tests {
    use super::{Preprocessor, SourceInput, assemble};
    use crate::config::{Mode, Options};
    use crate::error::PreprocessError;
    use crate::session::{FileState, Session};
    use crate::style::{Declaration, Layer, Rule, StyleSheet};
    use crate::table::TableResolver;
    use crate::test_support::FakeResolver;
    use pretty_assertions::assert_eq;

    fn session(mode: Mode) -> Session {
        Session::open(Options {
            prefix: "windi-".to_string(),
            mode,
        })
    }

    fn input<'a>(source: &'a str, filename: &'a str) -> SourceInput<'a> {
        SourceInput { source, filename }
    }

    fn layer_sheet(layer: Layer, selector: &str) -> StyleSheet {
        StyleSheet::from_rules(vec![Rule::new(
            selector,
            vec![Declaration::new("color", "red")],
        )])
        .with_layer(layer)
    }

    #[test]
    fn reprocessing_does_not_duplicate_tag_entries() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&[]));
        let mut session = session(Mode::ResolveInPlace);
        let source = "<div><p>hi</p></div>";

        preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("first pass");
        let second = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("second pass");

        assert!(second.new_tags.is_empty());
        assert_eq!(session.file_state("A.svelte"), FileState::SeenAgain);
        let summary = session.close();
        assert_eq!(summary.tags, 2);
        assert_eq!(summary.files, vec!["A.svelte".to_string()]);
    }

    #[test]
    fn assembles_preflight_then_utilities_then_directives() {
        let css = assemble(
            layer_sheet(Layer::Preflight, "p"),
            vec![layer_sheet(Layer::Utility, ".a")],
            vec![layer_sheet(Layer::Directive, ".0")],
            Mode::Rewrite,
        );
        let preflight = css.find("p {").expect("preflight rule");
        let utility = css.find(".a {").expect("utility rule");
        let directive = css.find(".0 {").expect("directive rule");
        assert!(preflight < utility && utility < directive);
    }

    #[test]
    fn assembly_ignores_fragment_order() {
        let fragments = || {
            vec![
                layer_sheet(Layer::Utility, ".b"),
                layer_sheet(Layer::Utility, ".a"),
                layer_sheet(Layer::Utility, ".c"),
            ]
        };
        let forward = assemble(StyleSheet::new(), fragments(), Vec::new(), Mode::Rewrite);
        let mut reversed_fragments = fragments();
        reversed_fragments.reverse();
        let reversed = assemble(StyleSheet::new(), reversed_fragments, Vec::new(), Mode::Rewrite);

        assert_eq!(forward, reversed);
        assert!(forward.starts_with(".a {"));
    }

    #[test]
    fn pipeline_keeps_kind_order_in_output() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["a", "z"]));
        let mut session = session(Mode::ResolveInPlace);
        let processed = preprocessor
            .process(
                &mut session,
                input("<p class:a class=\"z\"></p>", "A.svelte"),
            )
            .expect("process");
        let preflight = processed.css.find(":global(p)").expect("preflight");
        let utility = processed.css.find(":global(.z)").expect("utility");
        let directive = processed.css.find("\n.a {").expect("directive");
        assert!(preflight < utility && utility < directive);
    }

    #[test]
    fn rewrites_segments_and_appends_style_block() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["flex", "p-4", "m-2"]));
        let mut session = session(Mode::Rewrite);
        let source = "<div class=\"flex p-4\">\n  <span class=\"m-2\">x</span>\n</div>\n";

        let processed = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("process");

        let expected_markup =
            "<div class=\"windi-flex-p-4\">\n  <span class=\"windi-m-2\">x</span>\n</div>";
        assert!(processed.code.starts_with(expected_markup));
        assert_eq!(
            processed.code,
            format!("{}\n\n<style>\n{}</style>", expected_markup, processed.css)
        );
        assert!(!processed.code.contains("\"flex p-4\""));
        assert!(!processed.code.contains("\"m-2\""));
    }

    #[test]
    fn ignored_tokens_follow_emitted_token() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["flex"]));
        let mut session = session(Mode::Rewrite);
        let processed = preprocessor
            .process(
                &mut session,
                input("<div class=\"flex unknown-token\"></div>", "A.svelte"),
            )
            .expect("process");
        assert!(
            processed
                .code
                .starts_with("<div class=\"windi-flex unknown-token\"></div>")
        );
        assert_eq!(processed.ignored, vec!["unknown-token".to_string()]);
    }

    #[test]
    fn resolve_in_place_leaves_markup_and_unwraps_global_scope() {
        let preprocessor = Preprocessor::new(TableResolver::builtin().expect("tables"));
        let mut session = session(Mode::ResolveInPlace);
        let source = "<div class=\"flex w-1/2\"></div>";
        let processed = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("process");

        assert!(processed.code.starts_with(source));
        assert!(processed.css.contains(":global(.flex) {"));
        assert!(processed.css.contains(":global(.w-1\\/2) {"));
        assert!(!processed.css.contains("\n.flex {"));
    }

    #[test]
    fn rewrite_mode_never_wraps_utility_rules_globally() {
        let preprocessor = Preprocessor::new(TableResolver::builtin().expect("tables"));
        let mut session = session(Mode::Rewrite);
        let processed = preprocessor
            .process(&mut session, input("<div class=\"flex\"></div>", "A.svelte"))
            .expect("process");
        assert!(processed.css.contains("\n.windi-"));
        assert!(!processed.css.contains(":global(.windi-"));
    }

    #[test]
    fn global_baseline_follows_first_file() {
        let resolver = FakeResolver::new(&[]);
        let preprocessor = Preprocessor::new(&resolver);
        let mut session = session(Mode::ResolveInPlace);

        let first = preprocessor
            .process(&mut session, input("<h1>a</h1>", "A.svelte"))
            .expect("A");
        let second = preprocessor
            .process(&mut session, input("<h1>b</h1><p>c</p>", "B.svelte"))
            .expect("B");
        let revisit = preprocessor
            .process(&mut session, input("<div>edited</div>", "A.svelte"))
            .expect("A again");

        assert!(first.css.contains(":global(*)"));
        assert!(!second.css.contains(":global(*)"));
        assert_eq!(second.preflight_tags, vec!["p".to_string()]);
        // A stays the first seen file, so its reloads keep the baseline.
        assert!(revisit.css.contains(":global(*)"));
        assert_eq!(
            revisit.preflight_tags,
            vec!["div".to_string(), "h1".to_string()]
        );
        assert!(revisit.css.contains(":global(h1)"));
        assert_eq!(
            resolver.calls(),
            vec![
                "preflight:h1:true".to_string(),
                "preflight:p:false".to_string(),
                "preflight:div,h1:true".to_string(),
            ]
        );
    }

    #[test]
    fn inserts_full_sheet_into_every_style_block() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["flex"]));
        let mut session = session(Mode::ResolveInPlace);
        let source = "<div class=\"flex\"></div>\n<style>\n.a {}\n</style>\n<style>.b {}</style>\n";
        let processed = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("process");

        assert_eq!(processed.code.matches(processed.css.as_str()).count(), 2);
        assert!(processed.code.ends_with(".b {}</style>\n"));
        assert_eq!(processed.code.matches("<style>").count(), 2);
    }

    #[test]
    fn malformed_conditional_aborts_without_touching_session() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&[]));
        let mut session = session(Mode::ResolveInPlace);
        let err = preprocessor
            .process(
                &mut session,
                input("<div>{open ? 'a' : closed}</div>", "A.svelte"),
            )
            .expect_err("should fail");

        assert!(matches!(err, PreprocessError::MalformedConditional { .. }));
        assert_eq!(session.file_state("A.svelte"), FileState::Unseen);
        assert!(!session.has_tag("div"));
    }

    #[test]
    fn number_boolean_and_null_branches_process() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["hidden"]));
        let mut session = session(Mode::ResolveInPlace);
        let source = "<button tabindex={open ? 0 : -1} aria-hidden={open ? true : false}>{x ? null : 'hidden'}</button>";
        let processed = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("process");

        assert!(processed.code.starts_with(source));
        assert!(processed.css.contains(".hidden {"));
        assert!(session.has_tag("button"));
    }

    #[test]
    fn const_tag_conditionals_reach_the_stylesheet() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["ring", "shadow"]));
        let mut session = session(Mode::Rewrite);
        let source = "{#each rows as row}{@const cls = row.on ? 'ring' : 'shadow'}<p class={cls}></p>{/each}";
        let processed = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("process");

        assert!(processed.css.contains(".ring {"));
        assert!(processed.css.contains(".shadow {"));
    }

    #[test]
    fn directives_stay_in_place_in_rewrite_mode() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&["hidden", "a", "b"]));
        let mut session = session(Mode::Rewrite);
        let source = "<p class:hidden>{on ? 'a' : 'b'}</p>";
        let processed = preprocessor
            .process(&mut session, input(source, "A.svelte"))
            .expect("process");

        assert!(processed.code.starts_with(source));
        assert!(processed.css.contains("\n.hidden {"));
        assert!(processed.css.contains("\n.a {"));
        assert!(processed.css.contains("\n.b {"));
    }

    #[test]
    fn parse_errors_surface() {
        let preprocessor = Preprocessor::new(FakeResolver::new(&[]));
        let mut session = session(Mode::ResolveInPlace);
        assert!(matches!(
            preprocessor.process(&mut session, input("<div class=\"x", "A.svelte")),
            Err(PreprocessError::Parse { .. })
        ));
        assert!(!session.has_seen("A.svelte"));
    }
}
