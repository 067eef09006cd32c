use std::collections::HashMap;
use std::sync::Arc;

use stencil::{vars, Escape, Loader, Options, Scope, Template, TemplateError, MAX_INHERIT_DEPTH};

/// In-memory loader; every loaded template shares it.
#[derive(Clone)]
struct MapLoader {
    sources: Arc<HashMap<&'static str, &'static str>>,
    escape: Escape,
}

impl Loader for MapLoader {
    fn get_template(&self, name: &str, _from: &Template) -> Result<Template, TemplateError> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| TemplateError::load(name, "not found"))?;
        Template::new(source, self.options(name))
    }
}

impl MapLoader {
    fn new(sources: &[(&'static str, &'static str)]) -> Self {
        Self {
            sources: Arc::new(sources.iter().copied().collect()),
            escape: Escape::Plain,
        }
    }

    fn html(sources: &[(&'static str, &'static str)]) -> Self {
        Self {
            escape: Escape::Html,
            ..Self::new(sources)
        }
    }

    fn options(&self, name: &str) -> Options {
        Options::new()
            .name(name)
            .escape(self.escape)
            .loader(self.clone())
    }

    fn get(&self, name: &str) -> Template {
        Template::new(self.sources[name], self.options(name)).unwrap()
    }
}

#[test]
fn child_blocks_and_body_fill_the_parent() {
    let loader = MapLoader::new(&[
        ("P", "parent {{self.block}} / {{self.body}}"),
        ("child", "{{inherit \"P\"}}\nbody text\n{{def block}}X{{enddef}}"),
    ]);
    let out = loader.get("child").render(Scope::new()).unwrap();
    assert_eq!(out, "parent X / body text\n");
}

#[test]
fn parent_sees_the_child_bindings() {
    let loader = MapLoader::new(&[
        ("base", "<title>{{title}}</title>{{self.body}}"),
        ("page", "{{inherit 'base'}}{{py: title = 'Home'}}hello {{who}}"),
    ]);
    let out = loader.get("page").render(vars!(who = "you")).unwrap();
    assert_eq!(out, "<title>Home</title>hello you");
}

#[test]
fn parent_defaults_may_shadow_builtins() {
    let loader = MapLoader::new(&[
        ("base", "{{default str='base'}}{{default title='Untitled'}}{{str}} {{title}}"),
        ("page", "{{inherit 'base'}}{{py: title = 'Home'}}"),
    ]);
    let out = loader.get("page").render(Scope::new()).unwrap();
    assert_eq!(out, "base Home");
}

#[test]
fn missing_blocks_through_get_are_empty() {
    let loader = MapLoader::new(&[
        ("base", "[{{self.get.sidebar}}]{{if not self.get.sidebar}}none{{endif}}[{{self.get.title()}}]"),
        ("page", "{{inherit 'base'}}{{def title}}T{{enddef}}"),
    ]);
    assert_eq!(loader.get("page").render(Scope::new()).unwrap(), "[]none[T]");
}

#[test]
fn missing_blocks_without_get_fail() {
    let loader = MapLoader::new(&[("base", "{{self.sidebar}}"), ("page", "{{inherit 'base'}}")]);
    let err = loader.get("page").render(Scope::new()).unwrap_err();
    assert!(err.to_string().contains("has no attribute 'sidebar'"), "{}", err);
    assert!(err.to_string().ends_with("in base"), "{}", err);
}

#[test]
fn blocks_take_arguments() {
    let loader = MapLoader::new(&[
        ("base", "{{self.greet()}} {{self.greet('you')}} {{self.greet(who='all')}}"),
        ("page", "{{inherit 'base'}}{{def greet(who='world')}}Hello {{who}}{{enddef}}"),
    ]);
    assert_eq!(
        loader.get("page").render(Scope::new()).unwrap(),
        "Hello world Hello you Hello all"
    );
}

#[test]
fn blocks_see_names_bound_after_the_def() {
    let loader = MapLoader::new(&[
        ("base", "{{self.title}}"),
        ("page", "{{inherit 'base'}}{{def title}}{{site}}{{enddef}}{{py: site = 'late'}}"),
    ]);
    assert_eq!(loader.get("page").render(Scope::new()).unwrap(), "late");
}

#[test]
fn chains_resolve_one_parent_at_a_time() {
    let loader = MapLoader::new(&[
        ("base", "<{{self.title}}>{{self.body}}</>"),
        ("mid", "{{inherit 'base'}}{{def title}}[{{self.get.title}}]{{enddef}}mid:{{self.body}}"),
        ("leaf", "{{inherit 'mid'}}{{def title}}leaf{{enddef}}leafbody"),
    ]);
    assert_eq!(
        loader.get("leaf").render(Scope::new()).unwrap(),
        "<[leaf]>mid:leafbody</>"
    );
}

#[test]
fn inherited_html_is_not_escaped_twice() {
    let loader = MapLoader::html(&[
        ("base", "<main>{{self.body}}</main><h1>{{self.title}}</h1>"),
        ("page", "{{inherit 'base'}}{{def title}}{{t}}{{enddef}}<p>{{text}}</p>"),
    ]);
    let out = loader
        .get("page")
        .render(vars!(t = "a&b", text = "<hi>"))
        .unwrap();
    assert_eq!(out, "<main><p>&lt;hi&gt;</p></main><h1>a&amp;b</h1>");
}

#[test]
fn default_inherit_applies_without_a_directive() {
    let loader = MapLoader::new(&[("layout", "[{{self.body}}]"), ("other", "({{self.body}})")]);
    let t = Template::new(
        "content",
        Options::new()
            .default_inherit("layout")
            .loader(loader.clone()),
    )
    .unwrap();
    assert_eq!(t.render(Scope::new()).unwrap(), "[content]");

    let t = Template::new(
        "{{inherit 'other'}}content",
        Options::new()
            .default_inherit("layout")
            .shared_loader(Arc::new(loader)),
    )
    .unwrap();
    assert_eq!(t.render(Scope::new()).unwrap(), "(content)");
}

#[test]
fn closures_work_as_loaders() {
    let t = Template::new(
        "{{inherit parent_name}}x",
        Options::new().loader(|name: &str, from: &Template| {
            assert_eq!(from.name(), Some("child"));
            Template::new(&format!("{}:{{{{self.body}}}}", name), Options::new())
        }).name("child"),
    )
    .unwrap();
    assert_eq!(t.render(vars!(parent_name = "p")).unwrap(), "p:x");
}

#[test]
fn inheriting_without_a_loader_fails() {
    let t = Template::new("{{inherit 'base'}}", Options::new()).unwrap();
    let err = t.render(Scope::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Load { ref template, .. } if template == "base"));
    assert!(err.to_string().ends_with("no loader configured at line 1 column 3"), "{}", err);
}

#[test]
fn loader_errors_surface() {
    let loader = MapLoader::new(&[("page", "{{inherit 'nowhere'}}")]);
    let err = loader.get("page").render(Scope::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "cannot load template \"nowhere\": not found at line 1 column 3 in page"
    );
}

#[test]
fn missing_default_parent_names_the_child() {
    let loader = MapLoader::new(&[]);
    let t = Template::new(
        "content",
        Options::new().name("page").default_inherit("layout").loader(loader),
    )
    .unwrap();
    let err = t.render(Scope::new()).unwrap_err();
    assert_eq!(err.to_string(), "cannot load template \"layout\": not found in page");
}

#[test]
fn runaway_chains_are_cut_off() {
    fn looping(name: &str, _: &Template) -> Result<Template, TemplateError> {
        Template::new("{{inherit 'again'}}", Options::new().name(name).loader(looping))
    }
    let t = Template::new("{{inherit 'again'}}", Options::new().loader(looping)).unwrap();
    let err = t.render(Scope::new()).unwrap_err();
    assert!(
        err.to_string()
            .starts_with(&format!("inheritance chain deeper than {} templates", MAX_INHERIT_DEPTH)),
        "{}",
        err
    );
}

#[test]
fn errors_inside_blocks_keep_their_own_location() {
    let loader = MapLoader::new(&[
        ("base", "{{self.title}}"),
        ("page", "{{inherit 'base'}}\n{{def title}}{{nope}}{{enddef}}"),
    ]);
    let err = loader.get("page").render(Scope::new()).unwrap_err();
    assert_eq!(err.to_string(), "name 'nope' is not defined at line 2 column 16 in page");
}
