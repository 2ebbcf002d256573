#![cfg(unix)]

mod common;

use common::Project;
use protoforge_build::{check_expectations, Freshness};
use protoforge_config::load_config;

#[test]
fn eleven_files_from_four_sources() {
    let p = Project::new();
    p.config(
        r#"
[project]
name = "eleven"

[units.common]
sources = [{ dir = "src/common/proto" }]

[units.common.builtins.java]

[units.main]
sources = [
    { dir = "src/main/proto" },
    { dir = "src/main/extra" },
    { archive = "lib/shared-protos.tar.gz" },
    { artifact = "deps/vendor-protos.tgz" },
]
include = [{ archive = "deps/google-protos.tar.gz" }]
bases = ["common"]

[units.main.builtins.java]

[[expect]]
unit = "main"
compiled = 11

[[expect]]
unit = "common"
compiled = 4
"#,
    );
    p.proto_importing("src/main/proto/a.proto", "A", "google/protobuf/any.proto")
        .proto_importing("src/main/proto/b.proto", "B", "c1.proto")
        .proto("src/main/proto/c.proto", "C")
        .proto("src/main/proto/d.proto", "D")
        .proto("src/main/proto/nested/e.proto", "E")
        .file("src/main/proto/README.md", "not a schema")
        .proto("src/main/extra/f.proto", "F")
        .proto("src/main/extra/g.proto", "G")
        .tar_gz(
            "lib/shared-protos.tar.gz",
            &[
                ("h.proto", "message H {}"),
                ("sub/i.proto", "message I {}"),
                ("j.proto", "message J {}"),
                ("README.md", "docs"),
            ],
        )
        .tar_gz("deps/vendor-protos.tgz", &[("vendor/k.proto", "message K {}")])
        .tar_gz(
            "deps/google-protos.tar.gz",
            &[
                ("google/protobuf/any.proto", "message Any {}"),
                ("google/protobuf/timestamp.proto", "message Timestamp {}"),
            ],
        );
    for i in 1..=4 {
        p.proto(&format!("src/common/proto/c{i}.proto"), &format!("Common{i}"));
    }

    let report = p.build_default();
    assert!(report.is_success(), "{:?}", report.failures().collect::<Vec<_>>());

    let main = report.unit("main").unwrap();
    assert_eq!(main.compiled_count(), Some(11));
    // 4 own sources, 1 include-only archive, 1 inherited root
    assert_eq!(main.include_roots.len(), 6);
    assert_eq!(main.include_roots[0], p.path("src/main/proto"));
    assert_eq!(main.include_roots[5], p.path("src/common/proto"));
    assert_eq!(p.generated("main", "java").len(), 11);
    assert!(!p.generated("main", "java").contains(&"any.gen".to_string()));
    assert!(!p.generated("main", "java").contains(&"c1.gen".to_string()));

    let config = load_config(p.root()).unwrap();
    assert!(check_expectations(&config.expect, &report).is_empty());
}

#[test]
fn derived_unit_compiles_only_its_own_files() {
    let p = Project::new();
    p.config(
        r#"
[project]
name = "inherit"

[units.main]
sources = [{ dir = "src/main/proto" }]

[units.main.builtins.java]

[units.test]
sources = [{ dir = "src/test/proto" }]
bases = ["main"]

[units.test.builtins.java]
"#,
    );
    p.proto("src/main/proto/a.proto", "A")
        .file(
            "src/main/proto/bc.proto",
            "syntax = \"proto3\";\nmessage B {}\nmessage C {}\n",
        )
        .proto("src/main/proto/d.proto", "D")
        .proto_importing("src/test/proto/t1.proto", "T1", "a.proto")
        .proto_importing("src/test/proto/t2.proto", "T2", "bc.proto");

    let report = p.build_default();
    assert!(report.is_success());

    let test = report.unit("test").unwrap();
    assert_eq!(test.compiled_count(), Some(2));
    assert_eq!(
        test.include_roots,
        vec![p.path("src/test/proto"), p.path("src/main/proto")]
    );
    assert_eq!(p.generated("test", "java"), vec!["t1.gen", "t2.gen"]);
    assert_eq!(p.generated("main", "java"), vec!["a.gen", "bc.gen", "d.gen"]);

    let test_call = p
        .invocations()
        .into_iter()
        .find(|line| line.contains("t1.proto"))
        .unwrap();
    assert!(test_call.contains(&format!("-I{}", p.path("src/main/proto").display())));
    assert!(!test_call.contains("src/main/proto/a.proto"));

    let registry = &report.registry;
    assert_eq!(registry.sources_of("test"), [p.output("test").join("java")]);
    assert_eq!(registry.classpath_of("test"), vec![p.output("main").join("java")]);
    assert!(registry.classpath_of("main").is_empty());
}

#[test]
fn sibling_units_are_invisible() {
    let p = Project::new();
    p.config(
        r#"
[project]
name = "siblings"

[units.main]
sources = [{ dir = "src/main/proto" }]

[units.main.builtins.java]

[units.test]
sources = [{ dir = "src/test/proto" }]
bases = ["main"]

[units.test.builtins.java]

[units.androidTest]
sources = [{ dir = "src/androidTest/proto" }]
bases = ["main"]

[units.androidTest.builtins.java]
"#,
    );
    p.proto("src/main/proto/m.proto", "M")
        .proto("src/androidTest/proto/only_android.proto", "OnlyAndroid")
        .proto_importing("src/test/proto/t.proto", "T", "only_android.proto");

    let report = p.build_default();

    let err = report.unit("test").unwrap().outcome.as_ref().unwrap_err();
    assert_eq!(err.kind(), "compiler");
    assert!(err
        .to_string()
        .contains("Import \"only_android.proto\" was not found or had errors."));
    assert!(err
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("only_android.proto")));
    assert!(!p.output("test").exists());

    assert!(report.unit("main").unwrap().outcome.is_ok());
    assert!(report.unit("androidTest").unwrap().outcome.is_ok());
    assert!(report
        .unit("test")
        .unwrap()
        .include_roots
        .iter()
        .all(|r| !r.ends_with("src/androidTest/proto")));
    assert!(report.registry.classpath_of("test").is_empty());
}

#[test]
fn plugins_and_descriptor_set() {
    let p = Project::new();
    p.config(
        r#"
[project]
name = "plugins"

[plugins.grpc]
path = "tools/protoc-gen-grpc-java"

[units.main]
sources = [{ dir = "src/main/proto" }]
options = ["--experimental_allow_proto3_optional"]
descriptor_set = { include_imports = true }

[units.main.builtins.java]
options = ["lite"]

[units.main.plugins.grpc]
out_subdir = "grpc_output"
"#,
    );
    p.proto("src/main/proto/a.proto", "A");

    let report = p.build_default();
    assert!(report.is_success());

    assert_eq!(p.generated("main", "java"), vec!["a.gen"]);
    assert_eq!(p.generated("main", "grpc_output"), vec!["a.gen"]);
    let set = std::fs::read_to_string(p.output("main").join("descriptor_set.desc")).unwrap();
    assert!(set.contains("message A"));

    let calls = p.invocations();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.contains("--java_out=lite:"));
    assert!(call.contains(&format!(
        "--plugin=protoc-gen-grpc={}",
        p.path("tools/protoc-gen-grpc-java").display()
    )));
    assert!(call.contains("--include_imports"));
    assert!(call.contains("--experimental_allow_proto3_optional"));

    let main = report.unit("main").unwrap();
    let output = main.outcome.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(output.freshness, Freshness::Generated);
    assert_eq!(
        report.registry.sources_of("main"),
        [p.output("main").join("grpc_output"), p.output("main").join("java")]
    );
}

#[test]
fn long_command_lines_are_batched() {
    let p = Project::new();
    p.config_with(
        r#"
[project]
name = "batched"

[units.main]
sources = [{ dir = "src/main/proto" }]

[units.main.builtins.java]
"#,
        "max_command_len = 2000",
    );
    for i in 0..40 {
        p.proto(&format!("src/main/proto/message_{i:03}.proto"), &format!("M{i}"));
    }

    let report = p.build_default();
    assert!(report.is_success());
    assert!(p.invocations().len() > 1);
    assert_eq!(p.generated("main", "java").len(), 40);
    let output = report.unit("main").unwrap().outcome.as_ref().unwrap();
    assert_eq!(output.as_ref().unwrap().generated_files, 40);

    let calls = p.invocations().len();
    let again = p.build_default();
    assert_eq!(
        again.unit("main").unwrap().freshness(),
        Some(Freshness::UpToDate)
    );
    assert_eq!(p.invocations().len(), calls);
}
