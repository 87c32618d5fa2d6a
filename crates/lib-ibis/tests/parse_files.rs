//! Whole-file parsing of model-description and parameter text.

use lib_ibis::{
    keyword, parse_ami_file, parse_ibs_file, parse_param_values, parse_parameter_tree, resolve,
    resolve_all, CornerResolutionError, ParseError,
};
use lib_types::ami::{AmiValue, Corner};
use rayon::prelude::*;

const IBS: &str = "\
[IBIS Ver] 7.2
[File Name] foo.ibs
[Component] X
[Manufacturer] Acme
[Model] TX
Model_type Output
[Voltage Range] 1.8V 1.7V 1.9V
[Pulldown]
-1.0 -10mA -8mA -12mA
1.0 10mA 8mA 12mA
[Algorithmic Model]
Executable Linux_gcc_64 libtx.so tx.ami
[End Algorithmic Model]
[End]
";

const AMI: &str = r#"(example_tx
  (Reserved_Parameters
    (AMI_Version (Usage Info)(Type String)(Value "7.0"))
    (Init_Returns_Impulse (Usage Info)(Type Boolean)(Value True))
    (GetWave_Exists (Usage Info)(Type Boolean)(Value True))
    (Max_Init_Aggressors (Usage Info)(Type Int)(Value 4)))
  (Model_Specific
    (vswing (Usage In)(Type Float)(Format Corner 2.5 2.0 NA))
    (tx_taps
      (pre (Usage In)(Type Tap)(Format Corner -0.1 -0.05 -0.15))
      (post (Usage In)(Type Tap)(Format Corner 0.0 0.0 NA)(Optional True)))
    (tx_tap_units (Usage In)(Type Int)(Range 27 6 27))
    (eye_height (Usage Out)(Type Float)(Value 0.0))))
"#;

#[test]
fn test_file_name_and_component() {
    let doc = keyword::parse("[File Name] foo.ibs\n[Component] X").unwrap();
    assert_eq!(doc.get("FileName").unwrap().value(), "foo.ibs");
    assert_eq!(doc.get("Component").unwrap().value(), "X");
}

#[test]
fn test_typed_ibis_file() {
    let ibis = parse_ibs_file(IBS).unwrap();
    assert_eq!(ibis.header.file_name, "foo.ibs");
    assert_eq!(ibis.components[0].manufacturer, "Acme");
    let tx = ibis.model("tx").unwrap();
    assert_eq!(tx.voltage_range.unwrap().max, Some(1.9));
    let exe = tx
        .algorithmic_model
        .as_ref()
        .and_then(|a| a.executable_for("Linux", 64))
        .unwrap();
    assert_eq!(exe.ami_file, "tx.ami");
}

#[test]
fn test_truncation_at_keyword_boundaries_parses() {
    let mut offset = 0;
    let mut boundaries = Vec::new();
    for line in IBS.split_inclusive('\n') {
        if line.starts_with('[') {
            boundaries.push(offset);
        }
        offset += line.len();
    }
    assert!(boundaries.len() > 5);

    let mut previous = 0;
    for cut in boundaries {
        let doc = keyword::parse(&IBS[..cut]).unwrap();
        assert!(doc.len() >= previous);
        previous = doc.len();
    }
}

#[test]
fn test_truncation_inside_keyword_token_fails_at_cut() {
    let mut offset = 0;
    for (idx, line) in IBS.split_inclusive('\n').enumerate() {
        if line.starts_with('[') {
            let close = line.find(']').unwrap();
            for k in 1..=close {
                let cut = &IBS[..offset + k];
                let err = keyword::parse(cut).unwrap_err();
                let partial = cut.lines().last().unwrap().trim_end();
                match err {
                    ParseError::Syntax {
                        line,
                        column,
                        expected,
                        found,
                        ..
                    } => {
                        assert_eq!(line, idx + 1, "cut {cut:?}");
                        assert_eq!(column, partial.chars().count() + 1, "cut {cut:?}");
                        assert_eq!(expected, vec!["]"]);
                        assert_eq!(found, "end of input");
                    }
                    other => panic!("unexpected error for {cut:?}: {other}"),
                }
            }
        }
        offset += line.len();
    }
}

#[test]
fn test_truncated_triple_fails_at_cut() {
    let cut_at = IBS.find("1.9V").unwrap();
    let err = keyword::parse(&IBS[..cut_at]).unwrap_err();
    match err {
        ParseError::Syntax {
            line,
            expected,
            found,
            ..
        } => {
            assert_eq!(line, 7);
            assert_eq!(expected, vec!["number", "NA"]);
            assert_eq!(found, "end of input");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_ami_file_and_resolution() {
    let file = parse_ami_file(AMI).unwrap();
    assert!(file.getwave_exists());
    assert!(file.init_returns_impulse());

    let typ = resolve(&file.tree, Corner::Typ).unwrap();
    assert_eq!(typ.get("vswing"), Some(&AmiValue::Float(2.5)));
    assert_eq!(typ.get("tx_taps.post"), Some(&AmiValue::Float(0.0)));
    assert_eq!(typ.get("tx_tap_units"), Some(&AmiValue::Integer(27)));
    assert!(!typ.contains("eye_height"));
    assert!(!typ.contains("AMI_Version"));

    let min = resolve(&file.tree, Corner::Min).unwrap();
    assert_eq!(min.get("vswing"), Some(&AmiValue::Float(2.0)));

    let err = resolve(&file.tree, Corner::Max).unwrap_err();
    assert_eq!(
        err,
        CornerResolutionError::Unavailable {
            path: "Model-Specific.vswing".into(),
            corner: Corner::Max,
        }
    );
}

#[test]
fn test_resolved_text_reads_back() {
    let file = parse_ami_file(AMI).unwrap();
    let typ = resolve(&file.tree, Corner::Typ).unwrap();
    let text = typ.to_ami_string();
    assert!(text.starts_with("(example_tx "));
    assert_eq!(parse_param_values(&text).unwrap(), typ);
}

#[test]
fn test_parallel_resolution_matches_sequential() {
    let tree = parse_parameter_tree(AMI).unwrap();

    let sequential: Vec<_> = resolve_all(&tree)
        .into_iter()
        .map(|(c, r)| (c, r.map(|p| p.to_ami_string()).map_err(|e| e.to_string())))
        .collect();

    let parallel: Vec<_> = Corner::ALL
        .par_iter()
        .map(|&c| {
            (
                c,
                resolve(&tree, c)
                    .map(|p| p.to_ami_string())
                    .map_err(|e| e.to_string()),
            )
        })
        .collect();

    assert_eq!(sequential, parallel);
}

#[test]
fn test_parallel_parsing_of_many_files() {
    let texts: Vec<String> = (0..32)
        .map(|i| AMI.replace("example_tx", &format!("tx_{i}")))
        .collect();
    let names: Vec<String> = texts
        .par_iter()
        .map(|t| parse_ami_file(t).map(|f| f.name().to_string()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names.len(), 32);
    assert_eq!(names[7], "tx_7");
}

#[test]
fn test_canonical_round_trip() {
    let text = "(root (Mode (Usage In)(Type Int)(Value 1)))";
    assert_eq!(parse_parameter_tree(text).unwrap().to_ami_string(), text);

    let tree = parse_parameter_tree(AMI).unwrap();
    let canonical = tree.to_ami_string();
    assert_eq!(
        parse_parameter_tree(&canonical).unwrap().to_ami_string(),
        canonical
    );
}
