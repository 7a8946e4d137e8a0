//! Generated pages for property tests.

use proptest::prelude::*;

const CONTAINERS: [&str; 8] = ["div", "p", "span", "section", "ul", "li", "label", "button"];

const LEAVES: [&str; 13] = [
    "text",
    "<img src=a.png>",
    "<img src=b.png alt=''>",
    "<img src=c.png alt=Logo>",
    "<a href=#>more</a>",
    "<a href=#pricing tabindex=-1>Pricing</a>",
    "<input>",
    "<input id=q aria-label=Search>",
    "<button></button>",
    "<h2>Section</h2>",
    "<span style='color:#fff;background-color:#fff'>ghost</span>",
    "<div onclick='go()'>tap</div>",
    "<label for=q>Search</label>",
];

const STYLES: [&str; 3] = [
    "color: red",
    "background-color: #fff; margin: 2px",
    "color:#000;background-color:#000",
];

fn attributes() -> impl Strategy<Value = String> {
    (
        prop::option::of(0u8..4),
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 0..3),
        prop::option::of(prop::sample::select(STYLES.to_vec())),
    )
        .prop_map(|(id, classes, style)| {
            let mut out = String::new();
            if let Some(id) = id {
                out.push_str(&format!(" id=n{id}"));
            }
            if !classes.is_empty() {
                out.push_str(&format!(" class='{}'", classes.join(" ")));
            }
            if let Some(style) = style {
                out.push_str(&format!(" style='{style}'"));
            }
            out
        })
}

fn fragment() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(LEAVES.to_vec()).prop_map(str::to_string);
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            prop::sample::select(CONTAINERS.to_vec()),
            attributes(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(tag, attrs, children)| {
                format!("<{tag}{attrs}>{}</{tag}>", children.concat())
            })
    })
}

/// A whole document, sometimes missing `lang` or `<title>`.
pub(crate) fn page() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec(fragment(), 0..4),
    )
        .prop_map(|(lang, title, body)| {
            format!(
                "<html{}><head>{}</head><body>{}</body></html>",
                if lang { " lang=en" } else { "" },
                if title { "<title>Page</title>" } else { "" },
                body.concat()
            )
        })
}
