//! Integration tests for CloudCap.
//!
//! These tests verify the end-to-end functionality of the parser, model,
//! compiler, solver, analyzer and reporter modules, and the CLI exit codes.

use cloudcap::{Checker, CloudcapError, Config, Verdict};
use std::path::PathBuf;

/// Get the path to the test fixtures directory.
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

async fn queue_config() -> Config {
    Config::load(&fixtures_path().join("queue/cloudcap.yaml")).await.unwrap()
}

mod parser_tests {
    use super::*;
    use cloudcap::parser::TemplateParser;

    #[tokio::test]
    async fn test_parse_pipeline_template() {
        let template = TemplateParser::new()
            .parse_file(&fixtures_path().join("pipeline.yaml"))
            .await
            .unwrap();

        assert_eq!(template.len(), 3);
        assert!(template.parameters.contains("Stage"));
        assert_eq!(template.resources["BackfillFunction"].depends_on, vec!["IngestFunction".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_template() {
        let err = TemplateParser::new()
            .parse_file(&fixtures_path().join("malformed.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudcapError::TemplateParse { .. }));
    }
}

mod model_tests {
    use super::*;

    #[tokio::test]
    async fn test_pipeline_graph() {
        let model = Checker::new(Config::default())
            .build_model(&[fixtures_path().join("pipeline.yaml")], None)
            .await
            .unwrap();

        let deployment = &model.deployments()[0];
        let mut dependents: Vec<_> = deployment.dependents("OrdersQueue").iter().map(|r| r.id.clone()).collect();
        dependents.sort();
        assert_eq!(dependents, vec!["BackfillFunction", "IngestFunction"]);
        assert!(deployment.topological_order().is_some());
    }

    #[tokio::test]
    async fn test_cycle_never_reaches_solver() {
        let err = Checker::new(Config::default())
            .check(&[fixtures_path().join("cycle.yaml")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudcapError::Cycle { .. }));
        assert!(err.is_build_error());
    }

    #[tokio::test]
    async fn test_dangling_reference() {
        let err = Checker::new(Config::default())
            .build_model(&[fixtures_path().join("dangling.yaml")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudcapError::Reference { ref missing, .. } if missing == "MissingFunction"));
    }
}

mod analyzer_tests {
    use super::*;
    use cloudcap::model::AwsModel;
    use cloudcap::UsageEstimate;

    async fn queue_model(max: u64) -> AwsModel {
        let checker = Checker::new(queue_config().await);
        let mut model = checker
            .build_model(&[fixtures_path().join("queue/stack.yaml")], None)
            .await
            .unwrap();
        let id = model.deployments()[0].id().clone();
        model
            .deployment_mut(&id)
            .unwrap()
            .set_estimate("Queue1", "throughput", UsageEstimate::up_to(max));
        model
    }

    #[tokio::test]
    async fn test_queue_within_limit_passes() {
        let checker = Checker::new(queue_config().await);
        let report = checker
            .check(
                &[fixtures_path().join("queue/stack.yaml")],
                Some(fixtures_path().join("queue/within.yaml").as_path()),
            )
            .await
            .unwrap();
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_queue_beyond_limit_rejects() {
        let checker = Checker::new(queue_config().await);
        let report = checker
            .check(
                &[fixtures_path().join("queue/stack.yaml")],
                Some(fixtures_path().join("queue/beyond.yaml").as_path()),
            )
            .await
            .unwrap();

        let counterexample = report.verdict.counterexample().unwrap();
        let throughput = counterexample.value_of("Queue1", "throughput").unwrap();
        assert!(throughput > 1000 && throughput <= 1500, "throughput = {throughput}");
        assert_eq!(counterexample.violated, vec!["Queue1/throughput".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_analysis_is_identical() {
        let checker = Checker::new(queue_config().await);
        let model = queue_model(1500).await;

        let first = checker.analyze(&model).unwrap().verdict;
        for _ in 0..5 {
            assert_eq!(checker.analyze(&model).unwrap().verdict, first);
        }
    }

    #[tokio::test]
    async fn test_widening_never_turns_reject_into_pass() {
        let checker = Checker::new(queue_config().await);
        for max in [1001, 1500, 10_000, u64::from(u32::MAX)] {
            let verdict = checker.analyze(&queue_model(max).await).unwrap().verdict;
            assert!(verdict.is_reject(), "max = {max}");
        }
        assert!(checker.analyze(&queue_model(1000).await).unwrap().verdict.is_pass());
    }

    #[tokio::test]
    async fn test_fifo_producers_share_throughput() {
        let checker = Checker::new(Config::default());
        let template = [fixtures_path().join("pipeline.yaml")];

        let steady = checker
            .check(&template, Some(fixtures_path().join("pipeline-steady.yaml").as_path()))
            .await
            .unwrap();
        assert!(steady.verdict.is_pass());

        let burst = checker
            .check(&template, Some(fixtures_path().join("pipeline-burst.yaml").as_path()))
            .await
            .unwrap();
        let counterexample = burst.verdict.counterexample().unwrap();
        assert_eq!(counterexample.violated, vec!["OrdersQueue/fifo-throughput".to_string()]);
        let total = counterexample.value_of("IngestFunction", "nrequests").unwrap()
            + counterexample.value_of("BackfillFunction", "nrequests").unwrap();
        assert!(total > 300);
    }

    #[tokio::test]
    async fn test_queue_own_estimate_not_added_to_producers() {
        let checker = Checker::new(Config::default());
        let mut model = checker
            .build_model(
                &[fixtures_path().join("pipeline.yaml")],
                Some(fixtures_path().join("pipeline-steady.yaml").as_path()),
            )
            .await
            .unwrap();
        let id = model.deployments()[0].id().clone();
        model
            .deployment_mut(&id)
            .unwrap()
            .set_estimate("OrdersQueue", "nrequests", UsageEstimate::up_to(290));

        assert!(checker.analyze(&model).unwrap().verdict.is_pass());
    }

    #[tokio::test]
    async fn test_strict_rejects_partially_estimated_producers() {
        let mut config = Config::default();
        config.analysis.missing_estimate = cloudcap::compiler::MissingEstimatePolicy::Error;
        let checker = Checker::new(config);
        let mut model = checker
            .build_model(&[fixtures_path().join("pipeline.yaml")], None)
            .await
            .unwrap();
        let id = model.deployments()[0].id().clone();
        let deployment = model.deployment_mut(&id).unwrap();
        deployment.set_estimate("OrdersQueue", "inflight", UsageEstimate::up_to(10));
        deployment.set_estimate("IngestFunction", "nrequests", UsageEstimate::up_to(100));
        deployment.set_estimate("IngestFunction", "concurrency", UsageEstimate::up_to(10));
        deployment.set_estimate("BackfillFunction", "concurrency", UsageEstimate::up_to(10));

        let err = checker.analyze(&model).unwrap_err();
        assert!(matches!(
            err,
            CloudcapError::MissingEstimate { ref resource, ref metric, .. }
                if resource == "BackfillFunction" && metric == "nrequests"
        ));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_unknown() {
        let mut config = queue_config().await;
        config.solver.timeout_ms = 0;
        let report = Checker::new(config).analyze(&queue_model(1500).await).unwrap();
        assert!(report.verdict.is_unknown());
    }
}

mod reporter_tests {
    use super::*;
    use cloudcap::reporter::Reporter;
    use cloudcap::ReportFormat;

    #[tokio::test]
    async fn test_json_report() {
        let mut config = queue_config().await;
        config.output.pretty = false;
        let report = Checker::new(config.clone())
            .with_smtlib(true)
            .check(
                &[fixtures_path().join("queue/stack.yaml")],
                Some(fixtures_path().join("queue/beyond.yaml").as_path()),
            )
            .await
            .unwrap();

        let json = Reporter::new(&config).generate(&report, ReportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["verdict"], "REJECT");
        assert_eq!(parsed["deployments"][0]["constraints"][0]["id"], "Queue1/throughput");
        assert!(parsed["deployments"][0]["smtlib"].as_str().unwrap().contains("(check-sat)"));
    }

    #[tokio::test]
    async fn test_text_report() {
        let mut config = queue_config().await;
        config.output.colored = false;
        let report = Checker::new(config.clone())
            .check(
                &[fixtures_path().join("queue/stack.yaml")],
                Some(fixtures_path().join("queue/within.yaml").as_path()),
            )
            .await
            .unwrap();

        let text = Reporter::new(&config).generate(&report, ReportFormat::Text).unwrap();
        assert!(text.contains("Deployments"));
        assert!(text.contains("us-east-1/123456789012"));
        assert!(text.contains("PASS"));
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_config_loading() {
        let config = queue_config().await;
        assert_eq!(config.solver.timeout_ms, 5000);
        let registry = config.rule_registry().unwrap();
        assert!(registry.rules_for("Queue").is_some());
        assert!(registry.rules_for("AWS::SQS::Queue").is_some());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.analysis.parallel);
        assert_eq!(config.deployment.region, "us-east-1");
    }
}

mod cli_tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn cloudcap() -> Command {
        let mut cmd = Command::cargo_bin("cloudcap").unwrap();
        cmd.env_remove("CLOUDCAP_CONFIG").env_remove("RUST_LOG");
        cmd
    }

    fn fixture(name: &str) -> String {
        fixtures_path().join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_check_pass_exits_zero() {
        cloudcap()
            .args(["--config", &fixture("queue/cloudcap.yaml"), "check", &fixture("queue/stack.yaml")])
            .args(["--estimates", &fixture("queue/within.yaml"), "--no-color"])
            .assert()
            .code(0)
            .stdout(predicate::str::contains("PASS"));
    }

    #[test]
    fn test_check_reject_exits_one() {
        cloudcap()
            .args(["--config", &fixture("queue/cloudcap.yaml"), "check", &fixture("queue/stack.yaml")])
            .args(["--estimates", &fixture("queue/beyond.yaml"), "--format", "json"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("\"verdict\": \"REJECT\""))
            .stdout(predicate::str::contains("Queue1/throughput"));
    }

    #[test]
    fn test_check_timeout_exits_two() {
        cloudcap()
            .args(["--config", &fixture("queue/cloudcap.yaml"), "check", &fixture("queue/stack.yaml")])
            .args(["--estimates", &fixture("queue/beyond.yaml"), "--timeout-ms", "0", "--no-color"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("UNKNOWN"));
    }

    #[test]
    fn test_check_cycle_exits_three() {
        cloudcap()
            .args(["check", &fixture("cycle.yaml")])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("cycle").or(predicate::str::contains("Cycle")));
    }

    #[test]
    fn test_check_malformed_exits_four() {
        cloudcap().args(["check", &fixture("malformed.yaml")]).assert().code(4);
    }

    #[test]
    fn test_check_missing_file() {
        cloudcap().args(["check", "/no/such/stack.yaml"]).assert().code(14);
    }

    #[test]
    fn test_strict_missing_estimate() {
        cloudcap()
            .args(["--config", &fixture("queue/cloudcap.yaml"), "check", &fixture("queue/stack.yaml"), "--strict"])
            .assert()
            .code(5);
    }

    #[test]
    fn test_check_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.json");
        cloudcap()
            .args(["--config", &fixture("queue/cloudcap.yaml"), "check", &fixture("queue/stack.yaml")])
            .args(["-e", &fixture("queue/within.yaml"), "-f", "json", "-o"])
            .arg(&out)
            .assert()
            .code(0);
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("\"verdict\": \"PASS\""));
    }

    #[test]
    fn test_estimates_skeleton() {
        cloudcap()
            .args(["estimates", &fixture("pipeline.yaml")])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"arn:aws:lambda:us-east-1:123456789012:function:IngestFunction\":"))
            .stdout(predicate::str::contains("nrequests: [0, 0]"));
    }

    #[test]
    fn test_graph_dot() {
        cloudcap()
            .args(["graph", &fixture("pipeline.yaml")])
            .assert()
            .success()
            .stdout(predicate::str::contains("digraph"))
            .stdout(predicate::str::contains("OrdersQueue"));
    }

    #[test]
    fn test_rules_lists_builtins() {
        cloudcap()
            .arg("rules")
            .assert()
            .success()
            .stdout(predicate::str::contains("AWS::SQS::Queue"))
            .stdout(predicate::str::contains("fifo-throughput"));
    }

    #[test]
    fn test_validate_config() {
        cloudcap().args(["validate", &fixture("queue/cloudcap.yaml")]).assert().success();

        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "solver:\n  max_steps: 0\n").unwrap();
        cloudcap().arg("validate").arg(&bad).assert().code(6);
    }

    #[test]
    fn test_init_creates_config() {
        let dir = tempfile::tempdir().unwrap();
        cloudcap().current_dir(dir.path()).arg("init").assert().success();
        assert!(dir.path().join("cloudcap.yaml").exists());

        let written = std::fs::read_to_string(dir.path().join("cloudcap.yaml")).unwrap();
        assert!(Config::from_yaml(&written).is_ok());
    }
}
