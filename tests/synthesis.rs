//! End-to-end synthesis scenarios.
//!
//! Each test builds a tree, synthesizes it into a temporary directory and
//! inspects the written assembly through the reader.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde_json::{json, Value};
use tempfile::TempDir;

use cxsynth::assembly::{self, ArtifactType, CloudAssembly, ManifestError};
use cxsynth::construct::{StructuralError, Tree};
use cxsynth::core::types::{Environment, SchemaVersion};
use cxsynth::reference::ReferenceError;
use cxsynth::stack::{Resource, Stack, StackProps};
use cxsynth::synth::{synthesize, SynthError, SynthOptions};
use cxsynth::token::{ResolveError, ValueDomain};

fn stack(tree: &mut Tree, id: &str, env: Option<Environment>) -> Stack {
    let root = tree.root();
    let props = StackProps {
        env,
        ..StackProps::default()
    };
    Stack::new(tree, root, id, props).unwrap()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn outputs_with_prefix<'a>(template: &'a Value, prefix: &str) -> Vec<(&'a String, &'a Value)> {
    template["Outputs"]
        .as_object()
        .map(|o| o.iter().filter(|(k, _)| k.starts_with(prefix)).collect())
        .unwrap_or_default()
}

mod scenarios {
    use super::*;

    #[test]
    fn single_stack_single_resource() {
        let mut tree = Tree::new();
        let app = stack(&mut tree, "App", None);
        Resource::new(&mut tree, app.node(), "Bucket", "AWS::S3::Bucket", json!({})).unwrap();

        let out = TempDir::new().unwrap();
        let manifest = synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let stacks: Vec<_> = manifest
            .artifacts_of(ArtifactType::AwsCloudformationStack)
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(stacks, vec!["App".to_string()]);
        assert!(manifest.missing.is_empty());
        assert!(manifest.artifacts["App"].dependencies.is_empty());

        let template = read_json(&out.path().join("App.template.json"));
        let resources = template["Resources"].as_object().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources["Bucket"]["Type"], json!("AWS::S3::Bucket"));
    }

    #[test]
    fn cross_stack_reference_exports_and_imports() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        let b = stack(&mut tree, "B", None);
        let x = Resource::new(&mut tree, a.node(), "X", "AWS::S3::Bucket", json!({})).unwrap();
        let arn = x.get_att(&tree, "Arn");
        Resource::new(&mut tree, b.node(), "Y", "AWS::SNS::Topic", json!({ "Source": arn })).unwrap();

        let out = TempDir::new().unwrap();
        let manifest = synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let a_template = read_json(&out.path().join("A.template.json"));
        let exports = outputs_with_prefix(&a_template, "ExportsOutput");
        assert_eq!(exports.len(), 1);
        let (_, output) = exports[0];
        assert_eq!(output["Value"], json!({ "Fn::GetAtt": ["X", "Arn"] }));
        let export_name = output["Export"]["Name"].as_str().unwrap().to_string();
        assert!(export_name.starts_with("A:"));

        let b_template = read_json(&out.path().join("B.template.json"));
        assert_eq!(
            b_template["Resources"]["Y"]["Properties"]["Source"],
            json!({ "Fn::ImportValue": export_name })
        );
        assert_eq!(manifest.artifacts["B"].dependencies, vec!["A".to_string()]);
    }

    #[test]
    fn repeated_consumption_exports_once() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        let b = stack(&mut tree, "B", None);
        let x = Resource::new(&mut tree, a.node(), "X", "AWS::S3::Bucket", json!({})).unwrap();
        for id in ["Y1", "Y2", "Y3"] {
            let arn = x.get_att(&tree, "Arn");
            Resource::new(&mut tree, b.node(), id, "AWS::SNS::Topic", json!({ "Source": arn }))
                .unwrap();
        }

        let out = TempDir::new().unwrap();
        synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let a_template = read_json(&out.path().join("A.template.json"));
        assert_eq!(outputs_with_prefix(&a_template, "ExportsOutput").len(), 1);
    }

    #[test]
    fn same_stack_reference_stays_local() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        let x = Resource::new(&mut tree, a.node(), "X", "AWS::S3::Bucket", json!({})).unwrap();
        let arn = x.get_att(&tree, "Arn");
        Resource::new(&mut tree, a.node(), "Y", "AWS::SNS::Topic", json!({ "Source": arn })).unwrap();

        let out = TempDir::new().unwrap();
        synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let template = read_json(&out.path().join("A.template.json"));
        assert!(template.get("Outputs").is_none());
        assert_eq!(
            template["Resources"]["Y"]["Properties"]["Source"],
            json!({ "Fn::GetAtt": ["X", "Arn"] })
        );
    }

    #[test]
    fn cross_environment_reference_is_rejected() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", Some(Environment::new("1", "us-east-1")));
        let b = stack(&mut tree, "B", Some(Environment::new("2", "us-east-1")));
        let x = Resource::new(&mut tree, a.node(), "X", "AWS::S3::Bucket", json!({})).unwrap();
        let arn = x.get_att(&tree, "Arn");
        Resource::new(&mut tree, b.node(), "Y", "AWS::SNS::Topic", json!({ "Source": arn })).unwrap();

        let out = TempDir::new().unwrap();
        let target = out.path().join("cdk.out");
        let err = synthesize(&mut tree, &target, &SynthOptions::default()).unwrap_err();

        assert!(matches!(
            err,
            SynthError::Reference(ReferenceError::CrossEnvironment { .. })
        ));
        assert!(!err.output_may_be_partial());
        assert!(!target.exists());
    }

    #[test]
    fn token_cycle_names_both_tokens() {
        let mut tree = Tree::new();
        let app = stack(&mut tree, "App", None);

        let slot: Rc<RefCell<String>> = Rc::default();
        let back = slot.clone();
        let t2 = tree
            .tokens()
            .lazy(ValueDomain::String, "t2", move |_| Ok(json!(back.borrow().clone())));
        let t2_str = t2.as_string();
        let t1 = tree
            .tokens()
            .lazy(ValueDomain::String, "t1", move |_| Ok(json!(t2_str.clone())));
        *slot.borrow_mut() = t1.as_string();

        Resource::new(
            &mut tree,
            app.node(),
            "Bucket",
            "AWS::S3::Bucket",
            json!({ "BucketName": t1.as_string() }),
        )
        .unwrap();

        let out = TempDir::new().unwrap();
        let target = out.path().join("cdk.out");
        match synthesize(&mut tree, &target, &SynthOptions::default()).unwrap_err() {
            SynthError::Resolve(ResolveError::Cycle { tokens, reductions }) => {
                assert_eq!(reductions, 20);
                assert!(tokens.contains(&t1.id()));
                assert!(tokens.contains(&t2.id()));
            }
            other => panic!("expected token cycle, got {other}"),
        }
        assert!(!target.exists());
    }

    #[test]
    fn duplicate_sibling_id_keeps_first_child() {
        let mut tree = Tree::new();
        let root = tree.root();
        let first = tree.add_child(root, "X").unwrap();

        let err = tree.add_child(root, "X").unwrap_err();
        assert!(matches!(err, StructuralError::DuplicateId { .. }));
        assert_eq!(tree.children(root), &[first]);
        assert_eq!(tree.find_child(root, "X").unwrap(), first);
    }

    #[test]
    fn newer_manifest_major_is_rejected() {
        let out = TempDir::new().unwrap();
        let path = out.path().join("manifest.json");
        fs::write(&path, r#"{ "version": "5.0.0" }"#).unwrap();

        let err = assembly::load_with_max(&path, SchemaVersion::new(4, 99, 0)).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion { .. }));
    }
}

mod outputs {
    use super::*;

    fn build(tree: &mut Tree) {
        let a = stack(tree, "A", None);
        let b = stack(tree, "B", None);
        let x = Resource::new(tree, a.node(), "X", "AWS::S3::Bucket", json!({})).unwrap();
        let arn = x.get_att(tree, "Arn");
        Resource::new(tree, b.node(), "Y", "AWS::SNS::Topic", json!({ "Source": arn })).unwrap();
        let nested = Stack::new(tree, a.node(), "Inner", StackProps::default()).unwrap();
        Resource::new(tree, nested.node(), "Queue", "AWS::SQS::Queue", json!({})).unwrap();
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().into_owned(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn two_runs_are_byte_identical() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let mut tree = Tree::new();
        build(&mut tree);
        synthesize(&mut tree, first.path(), &SynthOptions::default()).unwrap();

        let mut other = Tree::new();
        build(&mut other);
        synthesize(&mut other, second.path(), &SynthOptions::default()).unwrap();

        assert_eq!(snapshot(first.path()), snapshot(second.path()));
    }

    #[test]
    fn resynthesizing_one_tree_is_byte_identical() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let mut tree = Tree::new();
        build(&mut tree);
        synthesize(&mut tree, first.path(), &SynthOptions::default()).unwrap();
        synthesize(&mut tree, second.path(), &SynthOptions::default()).unwrap();

        assert_eq!(snapshot(first.path()), snapshot(second.path()));
    }

    #[test]
    fn assembly_reopens_with_stacks_first() {
        let out = TempDir::new().unwrap();
        let mut tree = Tree::new();
        build(&mut tree);
        synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let assembly = CloudAssembly::open(out.path()).unwrap();
        assert_eq!(assembly.stacks(), vec!["A", "B"]);

        let order = assembly.deploy_order().unwrap();
        let position = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(position("A") < position("B"));

        let nested = assembly
            .manifest()
            .artifacts_of(ArtifactType::NestedCloudformationStack)
            .map(|(id, _)| id.clone())
            .next()
            .unwrap();
        assert!(position(&nested) < position("A"));
        assert!(assembly.tree().unwrap().is_some());
    }

    #[test]
    fn nested_stack_renders_as_resource() {
        let out = TempDir::new().unwrap();
        let mut tree = Tree::new();
        build(&mut tree);
        let manifest = synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let template = read_json(&out.path().join("A.template.json"));
        let inner = &template["Resources"]["Inner"];
        assert_eq!(inner["Type"], json!("AWS::CloudFormation::Stack"));

        let file = inner["Properties"]["TemplateURL"].as_str().unwrap();
        assert!(file.ends_with(".nested.template.json"));
        assert!(out.path().join(file).exists());

        let nested_ids: Vec<_> = manifest
            .artifacts_of(ArtifactType::NestedCloudformationStack)
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(nested_ids.len(), 1);
        assert!(manifest.artifacts["A"].dependencies.contains(&nested_ids[0]));
    }

    #[test]
    fn disabled_tree_metadata_skips_tree_json() {
        let out = TempDir::new().unwrap();
        let mut tree = Tree::new();
        build(&mut tree);
        let options = SynthOptions {
            tree_metadata: false,
            ..SynthOptions::default()
        };
        let manifest = synthesize(&mut tree, out.path(), &options).unwrap();

        assert!(manifest.artifacts_of(ArtifactType::CdkTree).next().is_none());
        assert!(!out.path().join("tree.json").exists());
    }
}

mod features {
    use super::*;
    use cxsynth::construct::context;

    #[test]
    fn file_asset_is_copied_and_listed() {
        let src = TempDir::new().unwrap();
        let source = src.path().join("handler.zip");
        fs::write(&source, b"zip bytes").unwrap();

        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        let asset = a.add_file_asset(&mut tree, &source).unwrap();

        let out = TempDir::new().unwrap();
        let manifest = synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let copied = out.path().join(asset.file_name());
        assert!(asset.file_name().ends_with(".zip"));
        assert_eq!(fs::read(&copied).unwrap(), b"zip bytes");

        let assets = read_json(&out.path().join("A.assets.json"));
        assert_eq!(
            assets["files"][&asset.hash]["source"]["path"],
            json!(asset.file_name())
        );

        let artifact = &manifest.artifacts["A.assets"];
        assert_eq!(artifact.artifact_type, ArtifactType::AssetManifest);
        assert_eq!(manifest.artifacts["A"].dependencies, vec!["A.assets".to_string()]);

        let entries = &manifest.artifacts["A"].metadata["/A"];
        assert!(entries.iter().any(|e| e.entry_type == "aws:cdk:asset"));
    }

    #[test]
    fn missing_context_lands_in_manifest() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", Some(Environment::new("123456789012", "us-east-1")));
        let props = json!({ "filter": "web" }).as_object().cloned().unwrap();
        let value = context::lookup(&mut tree, a.node(), "vpc-provider", props.clone(), json!("vpc-dummy"));
        assert_eq!(value, json!("vpc-dummy"));
        context::lookup(&mut tree, a.node(), "vpc-provider", props, json!("vpc-dummy"));

        let out = TempDir::new().unwrap();
        synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let written = assembly::load(&out.path().join("manifest.json")).unwrap();
        assert_eq!(written.missing.len(), 1);
        let missing = &written.missing[0];
        assert_eq!(missing.provider, "vpc-provider");
        assert_eq!(missing.props["account"], json!("123456789012"));
        assert_eq!(missing.props["region"], json!("us-east-1"));
    }

    #[test]
    fn write_failure_flags_partial_output() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        Resource::new(&mut tree, a.node(), "Bucket", "AWS::S3::Bucket", json!({})).unwrap();

        let dir = TempDir::new().unwrap();
        let occupied = dir.path().join("cdk.out");
        fs::write(&occupied, "not a directory").unwrap();

        let err = synthesize(&mut tree, &occupied, &SynthOptions::default()).unwrap_err();
        assert!(matches!(err, SynthError::Emit(_)));
        assert!(err.output_may_be_partial());
    }

    #[test]
    fn same_stack_list_reference_is_not_wrapped() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        let x = Resource::new(&mut tree, a.node(), "X", "AWS::EC2::VPC", json!({})).unwrap();
        let zones = x.get_att_list(&tree, "Zones");
        Resource::new(&mut tree, a.node(), "Y", "AWS::EC2::Subnet", json!({ "Zones": zones }))
            .unwrap();

        let out = TempDir::new().unwrap();
        synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let template = read_json(&out.path().join("A.template.json"));
        assert_eq!(
            template["Resources"]["Y"]["Properties"]["Zones"],
            json!({ "Fn::GetAtt": ["X", "Zones"] })
        );
    }

    #[test]
    fn cross_stack_list_reference_is_split_on_import() {
        let mut tree = Tree::new();
        let a = stack(&mut tree, "A", None);
        let b = stack(&mut tree, "B", None);
        let x = Resource::new(&mut tree, a.node(), "X", "AWS::EC2::VPC", json!({})).unwrap();
        let zones = x.get_att_list(&tree, "Zones");
        Resource::new(&mut tree, b.node(), "Y", "AWS::EC2::Subnet", json!({ "Zones": zones }))
            .unwrap();

        let out = TempDir::new().unwrap();
        synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();

        let a_template = read_json(&out.path().join("A.template.json"));
        let exports = outputs_with_prefix(&a_template, "ExportsOutput");
        assert_eq!(exports.len(), 1);
        let (_, output) = exports[0];
        assert_eq!(
            output["Value"],
            json!({ "Fn::Join": [",", { "Fn::GetAtt": ["X", "Zones"] }] })
        );
        let export_name = output["Export"]["Name"].as_str().unwrap().to_string();

        let b_template = read_json(&out.path().join("B.template.json"));
        assert_eq!(
            b_template["Resources"]["Y"]["Properties"]["Zones"],
            json!({ "Fn::Split": [",", { "Fn::ImportValue": export_name }] })
        );
    }
}
