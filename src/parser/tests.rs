use std::collections::BTreeMap;

use super::desugar::{self, MODIFIERS};
use super::lexer::{OPERATORS, UNARY_OR_GROUPING};
use super::node::{Substitution, Tag};
use super::registry::EntityRegistry;
use super::{rc_override, scan_config_overrides, Classifier, Modification, ParseError, ParserContext};

fn context() -> ParserContext {
    let mut registry = EntityRegistry::new(2);
    for (cmd, write) in [
        ("add", true),
        ("log", true),
        ("modify", true),
        ("done", true),
        ("list", false),
        ("information", false),
        ("count", false),
    ] {
        registry.register("cmd", cmd);
        registry.register(if write { "writecmd" } else { "readcmd" }, cmd);
    }
    for column in [
        "description", "status", "uuid", "project", "priority", "tags", "depends", "due",
        "entry", "end", "wait", "id",
    ] {
        registry.register("attribute", column);
    }
    registry.register("uda", "estimate");
    registry.register("attribute", "estimate");
    registry.register("pseudo", "limit");
    for modifier in MODIFIERS {
        registry.register("modifier", modifier);
    }
    for op in OPERATORS {
        registry.register("operator", op);
        if !UNARY_OR_GROUPING.contains(op) {
            registry.register("binary_operator", op);
        }
    }
    ParserContext {
        registry,
        default_command: "list".to_string(),
        modifiable: ["description", "project", "priority", "tags", "due", "wait", "status"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        ..ParserContext::default()
    }
}

fn args(raw: &[&str]) -> Vec<String> {
    std::iter::once("strand")
        .chain(raw.iter().copied())
        .map(str::to_string)
        .collect()
}

fn classify(ctx: ParserContext, raw: &[&str]) -> Classifier {
    let mut classifier = Classifier::new(ctx, &args(raw));
    classifier.analyze(true, true).expect("analysis should succeed");
    classifier
}

fn filter_of(raw: &[&str]) -> String {
    classify(context(), raw)
        .get_filter(false)
        .expect("filter should compose")
}

#[test]
fn strict_analysis_without_default_command_is_trivial_input() {
    let mut ctx = context();
    ctx.default_command = String::new();
    let mut classifier = Classifier::new(ctx, &args(&[]));
    let err = classifier
        .analyze(true, true)
        .expect_err("empty command line should be rejected");
    assert_eq!(err, ParseError::TrivialInput);
    assert_eq!(err.to_string(), "You must specify a command or a task to modify.");
}

#[test]
fn default_command_is_spliced_after_the_binary() {
    let classifier = classify(context(), &["+home"]);
    let raws = classifier
        .nodes
        .iter()
        .map(|node| node.raw.as_str())
        .collect::<Vec<_>>();
    assert_eq!(raws[..2], ["strand", "list"]);
    assert!(classifier.nodes[1].has(Tag::Default));
    assert_eq!(classifier.get_command(), "list");
}

#[test]
fn selectors_collapse_into_one_clause() {
    let classifier = classify(context(), &["1,3,5-10", "2a6f0000,9c4e0000", "list"]);
    assert_eq!(
        classifier.clone().get_filter(false).expect("filter should compose"),
        "( ( ( id == 1 ) or ( id == 3 ) or ( id >= 5 and id <= 10 ) or ( uuid = '2a6f0000' ) or ( uuid = '9c4e0000' ) ) )"
    );
    assert!(!classifier
        .nodes
        .iter()
        .any(|node| node.has(Tag::Id) || node.has(Tag::Uuid)));
}

#[test]
fn bare_selector_assumes_information() {
    let classifier = classify(context(), &["3"]);
    assert_eq!(classifier.get_command(), "information");
    assert!(classifier
        .notes()
        .iter()
        .any(|note| matches!(note, super::Note::Header(text) if text.contains("assuming"))));
}

#[test]
fn attribute_modifiers_desugar_through_the_table() {
    assert_eq!(filter_of(&["list", "due.before:2024-01-01"]), "( due < '2024-01-01' )");
    assert_eq!(filter_of(&["list", "due.none:"]), "( due == '' )");
    assert_eq!(filter_of(&["list", "due.bef:2024-01-01"]), "( due < '2024-01-01' )");
    assert_eq!(
        filter_of(&["list", "description.startswith:pay"]),
        "( description ~ '^pay' )"
    );
}

#[test]
fn unknown_modifier_names_the_offender() {
    let mut classifier = Classifier::new(context(), &args(&["list", "due.zzz:x"]));
    let err = classifier
        .analyze(true, true)
        .expect_err("unknown modifier should be rejected");
    assert_eq!(err, ParseError::UnknownModifier("zzz".to_string()));
    assert!(err.to_string().contains("zzz"));
}

#[test]
fn attribute_tag_and_word_sugar() {
    assert_eq!(
        filter_of(&["list", "pro:home", "status:pending"]),
        "( project = 'home' and status == 'pending' )"
    );
    assert_eq!(
        filter_of(&["list", "+home", "-work"]),
        "( tags _hastag_ 'home' and tags _notag_ 'work' )"
    );
    assert_eq!(filter_of(&["list", "/bills/"]), "( description ~ 'bills' )");
    assert_eq!(filter_of(&["list", "pay"]), "( description ~ 'pay' )");
    assert_eq!(filter_of(&["list", "estimate:3"]), "( estimate = '3' )");
}

#[test]
fn expression_arguments_are_exploded() {
    assert_eq!(
        filter_of(&["list", "(+home or +work)"]),
        "( ( tags _hastag_ 'home' or tags _hastag_ 'work' ) )"
    );
    assert_eq!(filter_of(&["list", "pay the bills"]), "( description ~ 'pay the bills' )");
}

#[test]
fn blank_arguments_are_dropped() {
    assert_eq!(filter_of(&["list", "", "  "]), "");
    assert_eq!(filter_of(&["list", " pay ", ""]), "( description ~ 'pay' )");
}

#[test]
fn operators_protect_the_following_word() {
    assert_eq!(filter_of(&["list", "(", "pay", ")"]), "( ( pay ) )");
    assert_eq!(
        filter_of(&["list", "pay", "or", "bills"]),
        "( description ~ 'pay' or bills )"
    );
}

#[test]
fn limit_is_pseudo_and_not_filter() {
    let classifier = classify(context(), &["list", "limit:5"]);
    assert_eq!(classifier.get_limit(), "5");
    assert_eq!(classifier.clone().get_filter(false).expect("filter"), "");
    assert_eq!(classify(context(), &["list"]).get_limit(), "0");
}

#[test]
fn desugaring_is_a_fixed_point() {
    let ctx = context();
    for raw in [
        vec!["1-3", "list", "+home", "pro:x", "pay"],
        vec!["list", "due.after:2024-01-01", "(+a or +b)"],
        vec!["a360fc44", "list", "limit:2", "word"],
    ] {
        let classifier = classify(ctx.clone(), &raw);
        let once = classifier.nodes.to_vec();
        let twice = desugar::run(once.clone(), &ctx, &|_, _| {}).expect("rerun should succeed");
        assert_eq!(once, twice, "rerun changed {:?}", raw);
    }
}

#[test]
fn stray_filter_terms_become_modifications_for_add() {
    let classifier = classify(context(), &["+work", "add", "pay", "the", "bills"]);
    assert_eq!(classifier.clone().get_filter(false).expect("filter"), "");
    assert_eq!(
        classifier.get_modifications(),
        vec![
            Modification::Tag {
                add: true,
                name: "work".to_string()
            },
            Modification::Word("pay".to_string()),
            Modification::Word("the".to_string()),
            Modification::Word("bills".to_string()),
        ]
    );
}

#[test]
fn modifications_decompose_in_place() {
    let classifier = classify(
        context(),
        &["1", "modify", "pro:home", "-work", "/teh/the/", "due:", "uuid:x", "due.before:y", "--", "+literal"],
    );
    assert_eq!(
        classifier.get_modifications(),
        vec![
            Modification::Attribute {
                name: "project".to_string(),
                value: "home".to_string(),
                uda: false,
                modifiable: true,
            },
            Modification::Tag {
                add: false,
                name: "work".to_string()
            },
            Modification::Substitution(Substitution {
                from: "teh".to_string(),
                to: "the".to_string(),
                global: false,
            }),
            Modification::Attribute {
                name: "due".to_string(),
                value: String::new(),
                uda: false,
                modifiable: true,
            },
            Modification::Attribute {
                name: "uuid".to_string(),
                value: "x".to_string(),
                uda: false,
                modifiable: false,
            },
            Modification::AttributeModifier {
                name: "due".to_string(),
                modifier: "before".to_string(),
                value: "y".to_string(),
            },
            Modification::Word("+literal".to_string()),
        ]
    );
}

#[test]
fn context_is_injected_once_unless_a_task_is_targeted() {
    let mut ctx = context();
    ctx.context = Some(("work".to_string(), "project:work".to_string()));

    let mut classifier = classify(ctx.clone(), &["list", "+urgent"]);
    let filter = classifier.get_filter(true).expect("context filter");
    assert_eq!(
        filter,
        "( ( project = 'work' ) and tags _hastag_ 'urgent' )"
    );
    assert_eq!(classifier.get_filter(true).expect("second call"), filter);

    let mut targeted = classify(ctx, &["2", "list"]);
    assert_eq!(
        targeted.get_filter(true).expect("targeted filter"),
        "( ( ( id == 2 ) ) )"
    );
}

#[test]
fn aliases_overrides_and_words() {
    let mut ctx = context();
    let mut aliases = BTreeMap::new();
    aliases.insert("ls".to_string(), "list +next".to_string());
    ctx.aliases = aliases;
    let classifier = classify(ctx, &["rc.gc:off", "ls", "foo", "--", "bar"]);
    assert_eq!(classifier.get_command(), "list");
    assert_eq!(
        super::passes::config_overrides(&classifier.nodes),
        vec![("gc".to_string(), "off".to_string())]
    );
    assert_eq!(
        classifier.get_words().expect("words should analyze"),
        vec!["+next".to_string(), "foo".to_string(), "bar".to_string()]
    );
    assert!(classifier.dump("final").contains("list [CMD READCMD ALIAS LEX]"));
}

#[test]
fn pre_scans_find_rc_file_and_overrides() {
    let raw = args(&["rc:/tmp/a", "rc.verbose=off", "rc:/tmp/b", "--", "rc:/tmp/c"]);
    assert_eq!(rc_override(&raw), Some("/tmp/b".to_string()));
    assert_eq!(
        scan_config_overrides(&raw),
        vec![("verbose".to_string(), "off".to_string())]
    );
}
