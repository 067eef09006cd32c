use proptest::prelude::*;
use stencil::{compile, html_quote, substitute, substitute_html, vars, Looper, Scope};

// Template fragments that always compile when concatenated in any order.
fn fragment_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("text "),
        Just("\n"),
        Just("{{x}}"),
        Just("{{x * 2}}"),
        Just("{{if x > 0}}pos{{else}}neg{{endif}}"),
        Just("{{for i in range(x % 4)}}{{i}},{{endfor}}"),
        Just("{{default y = x}}{{y}}"),
        Just("  {{if x}}\n"),
        Just("{{endif}}\n"),
    ]
}

fn balanced_source() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment_strategy(), 0..12).prop_map(|parts| {
        // pair up the dangling `if` lines so the source stays balanced
        let mut out = String::new();
        let mut open = 0usize;
        for part in parts {
            match part {
                "{{endif}}\n" if open == 0 => continue,
                "{{endif}}\n" => open -= 1,
                "  {{if x}}\n" => open += 1,
                _ => {}
            }
            out.push_str(part);
        }
        for _ in 0..open {
            out.push_str("{{endif}}\n");
        }
        out
    })
}

proptest! {
    #[test]
    fn text_without_delimiters_is_unchanged(text in "[a-zA-Z0-9 \n\t.,;:!?<>&'\"-]*") {
        prop_assert_eq!(substitute(&text, Scope::new()).unwrap(), text);
    }

    #[test]
    fn name_substitution(name in "[^{}]*") {
        let out = substitute("Hi {{name}}", vars!(name = name.as_str())).unwrap();
        prop_assert_eq!(out, format!("Hi {}", name));
    }

    #[test]
    fn html_output_is_escaped(value in ".*") {
        let out = substitute_html("{{v}}", vars!(v = value.as_str())).unwrap();
        prop_assert!(!out.contains('<') && !out.contains('>') && !out.contains('"'));
        prop_assert_eq!(out, html_quote(&value));
    }

    #[test]
    fn default_never_overwrites(x in any::<i64>()) {
        prop_assert_eq!(substitute("{{default x=1}}{{x}}", vars!(x = x)).unwrap(), x.to_string());
    }

    #[test]
    fn break_stops_at_the_first_zero(items in prop::collection::vec(0i64..5, 0..20)) {
        let out = substitute(
            "{{for i in x}}{{if not i}}{{break}}{{endif}}{{i}} {{endfor}}",
            vars!(x = items.clone()),
        )
        .unwrap();
        let expected: String = items
            .iter()
            .take_while(|i| **i != 0)
            .map(|i| format!("{} ", i))
            .collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn continue_skips_zeros(items in prop::collection::vec(0i64..5, 0..20)) {
        let out = substitute(
            "{{for i in x}}{{if not i}}{{continue}}{{endif}}{{i}} {{endfor}}",
            vars!(x = items.clone()),
        )
        .unwrap();
        let expected: String = items
            .iter()
            .filter(|i| **i != 0)
            .map(|i| format!("{} ", i))
            .collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn compiling_twice_renders_identically(source in balanced_source(), x in -5i64..5) {
        let first = compile(&source).unwrap();
        let second = compile(&source).unwrap();
        prop_assert_eq!(
            first.render(vars!(x = x)).unwrap(),
            second.render(vars!(x = x)).unwrap()
        );
    }

    #[test]
    fn looper_positions(items in prop::collection::vec(any::<u8>(), 1..30)) {
        let len = items.len();
        for (pos, item) in Looper::new(items.clone()) {
            prop_assert_eq!(pos.number(), pos.index() + 1);
            prop_assert_eq!(pos.first(), pos.index() == 0);
            prop_assert_eq!(pos.last(), pos.index() == len - 1);
            prop_assert_eq!(*pos.item(), item);
            // a constant key only breaks groups at the ends
            prop_assert_eq!(pos.first_group(|_| 0), pos.first());
            prop_assert_eq!(pos.last_group(|_| 0), pos.last());
            prop_assert_eq!(
                pos.first_group(|i| *i),
                pos.previous().map_or(true, |prev| *prev != item)
            );
        }
    }
}
