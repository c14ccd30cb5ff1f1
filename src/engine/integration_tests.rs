// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Integration tests for the workflow scheduler using the built-in units
/// and the stub units
#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backends::stub::{
        event_log, CancellingUnit, EventLog, FailAt, FailingUnit, RecordingUnit, SlowUnit,
    };
    use crate::backends::{BackendRegistry, Kernel, KernelSource};
    use crate::config::Settings;
    use crate::engine::{InitContext, LaunchArg, RunContext, Workflow, WorkflowState};
    use crate::errors::{BackendError, MemoryError, UnitError, WorkflowError};
    use crate::memory::{BufferId, DType, Residency, Shape, SlotSpec};
    use crate::testing::for_each_backend;
    use crate::traits::{BackendRequest, Unit};
    use crate::units::{scale, AddUnit, ScaleUnit, SourceUnit, SumUnit};

    /// Consumer declaring a fixed input shape and element type.
    struct FixedInput {
        shape: Shape,
        dtype: Option<DType>,
    }

    #[async_trait]
    impl Unit for FixedInput {
        fn type_name(&self) -> &'static str {
            "fixed_input"
        }

        fn declare_inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::fixed("input", self.shape.clone(), self.dtype)]
        }

        fn declare_outputs(&self) -> Vec<SlotSpec> {
            Vec::new()
        }

        async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
            Ok(())
        }

        async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
            ctx.input_f64("input").map(|_| ())
        }
    }

    /// Tries to write a buffer it does not own.
    struct Trespasser {
        victim: BufferId,
    }

    #[async_trait]
    impl Unit for Trespasser {
        fn type_name(&self) -> &'static str {
            "trespasser"
        }

        fn declare_inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::deferred("input")]
        }

        fn declare_outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::fixed("out", Shape::vector(1), None)]
        }

        async fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
            Ok(())
        }

        async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
            ctx.buffer_mut(self.victim)?.write_f64(&[0.0; 4])?;
            Ok(())
        }
    }

    /// Launches the scale kernel over twice as many items as its input holds.
    struct Overreach {
        kind: String,
        kernel: Option<Kernel>,
        len: usize,
    }

    #[async_trait]
    impl Unit for Overreach {
        fn type_name(&self) -> &'static str {
            "overreach"
        }

        fn declare_inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::deferred("input")]
        }

        fn declare_outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::deferred("output")]
        }

        fn backend_request(&self) -> Option<BackendRequest> {
            Some(BackendRequest::new(self.kind.clone(), 0))
        }

        async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
            let input = ctx.input_spec("input")?;
            ctx.resize_output("output", input.shape.clone())?;
            self.len = input.element_count();
            self.kernel = Some(ctx.compile(&scale::kernel_source(input.dtype))?);
            Ok(())
        }

        async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
            let kernel = self.kernel.as_ref().ok_or(UnitError::MissingBackend)?;
            ctx.launch(
                kernel,
                &[
                    LaunchArg::Input("input"),
                    LaunchArg::Output("output"),
                    LaunchArg::Scalar(2.0),
                ],
                self.len * 2,
            )
        }
    }

    /// Writes 99 to each item of `out` and fails at item 1, then doubles
    /// whatever `out` holds into `doubled` before reporting the failure.
    struct Interrupted {
        kind: String,
        kernels: Option<(Kernel, Kernel)>,
    }

    fn interrupted_source() -> KernelSource {
        KernelSource::new("interrupted")
            .with_host(|args, _| {
                let output = args[0].host_mut().ok_or("arg 0 must be a buffer")?;
                let mut values = output.to_f64_vec();
                values[0] = 99.0;
                output.copy_from_f64(&values);
                Err("stopped at work item 1".to_string())
            })
            .with_wasm(
                r#"(module
  (import "env" "memory" (memory 1))
  (func (export "kernel") (param $gid i32) (param $dst i32)
    (f32.store
      (i32.add (local.get $dst) (i32.mul (local.get $gid) (i32.const 4)))
      (f32.const 99))
    (if (i32.eq (local.get $gid) (i32.const 1))
      (then unreachable))))"#,
            )
    }

    #[async_trait]
    impl Unit for Interrupted {
        fn type_name(&self) -> &'static str {
            "interrupted"
        }

        fn declare_inputs(&self) -> Vec<SlotSpec> {
            Vec::new()
        }

        fn declare_outputs(&self) -> Vec<SlotSpec> {
            vec![
                SlotSpec::fixed("out", Shape::vector(3), Some(DType::F32)),
                SlotSpec::fixed("doubled", Shape::vector(3), Some(DType::F32)),
            ]
        }

        fn backend_request(&self) -> Option<BackendRequest> {
            Some(BackendRequest::new(self.kind.clone(), 0))
        }

        async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
            ctx.resize_output("out", vec![3])?;
            ctx.resize_output("doubled", vec![3])?;
            ctx.write_output_f64("out", &[5.0, 5.0, 5.0])?;
            self.kernels = Some((
                ctx.compile(&interrupted_source())?,
                ctx.compile(&scale::kernel_source(DType::F32))?,
            ));
            Ok(())
        }

        async fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
            let (interrupted, doubler) = self.kernels.as_ref().ok_or(UnitError::MissingBackend)?;
            let failure = ctx.launch(interrupted, &[LaunchArg::Update("out")], 3);
            ctx.launch(
                doubler,
                &[
                    LaunchArg::Update("out"),
                    LaunchArg::Output("doubled"),
                    LaunchArg::Scalar(2.0),
                ],
                3,
            )?;
            failure
        }
    }

    fn doubling_workflow(registry: Arc<BackendRegistry>, backend: Option<&str>) -> Workflow {
        let mut workflow = Workflow::new().with_registry(registry);
        let scale = match backend {
            Some(kind) => ScaleUnit::new(2.0).on_backend(BackendRequest::new(kind, 0)),
            None => ScaleUnit::new(2.0),
        };
        workflow
            .add_unit("source", Box::new(SourceUnit::new(vec![1.0, 2.0, 3.0, 4.0])))
            .unwrap();
        workflow.add_unit("double", Box::new(scale)).unwrap();
        workflow.link("double", "input", "source", "output").unwrap();
        workflow
    }

    fn chain(log: &EventLog, names: &[&str]) -> Workflow {
        let mut workflow = Workflow::new();
        let mut previous: Option<&str> = None;
        for name in names {
            let inputs: Vec<&str> = previous.map(|_| "input").into_iter().collect();
            workflow
                .add_unit(*name, Box::new(RecordingUnit::new(name, &inputs, log)))
                .unwrap();
            if let Some(producer) = previous {
                workflow.link(name, "input", producer, "out").unwrap();
            }
            previous = Some(name);
        }
        workflow
    }

    fn events(log: &EventLog) -> Vec<String> {
        log.lock().clone()
    }

    #[tokio::test]
    async fn test_source_to_host_double_pipeline() {
        let mut workflow = doubling_workflow(BackendRegistry::global(), None);
        workflow.initialize().await.unwrap();
        workflow.run_tick().await.unwrap();

        assert_eq!(workflow.tick(), 1);
        assert_eq!(workflow.state(), WorkflowState::Running);
        assert_eq!(workflow.read_output("double", "output").unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
        workflow.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_pipeline_on_every_backend() {
        let registry = Arc::new(BackendRegistry::with_builtin());
        let visited = for_each_backend(&registry, true, |backend| {
            let registry = registry.clone();
            async move {
                let mut workflow = doubling_workflow(registry, Some(backend.kind()));
                workflow.initialize().await.unwrap();
                workflow.run(2).await.unwrap();
                assert_eq!(
                    workflow.read_output("double", "output").unwrap(),
                    vec![2.0, 4.0, 6.0, 8.0]
                );
                workflow.stop().await.unwrap();
                assert_eq!(workflow.device_allocations(), 0);
            }
        })
        .await;
        assert_eq!(visited, vec!["numeric".to_string(), "wasm".to_string()]);
    }

    #[tokio::test]
    async fn test_launch_beyond_buffer_length_fails_on_every_backend() {
        let registry = Arc::new(BackendRegistry::with_builtin());
        for_each_backend(&registry, true, |backend| {
            let registry = registry.clone();
            async move {
                let mut workflow = Workflow::new().with_registry(registry);
                workflow
                    .add_unit("source", Box::new(SourceUnit::new(vec![1.0, 2.0, 3.0, 4.0])))
                    .unwrap();
                workflow
                    .add_unit(
                        "overreach",
                        Box::new(Overreach {
                            kind: backend.kind().to_string(),
                            kernel: None,
                            len: 0,
                        }),
                    )
                    .unwrap();
                workflow.link("overreach", "input", "source", "output").unwrap();
                workflow.initialize().await.unwrap();

                let err = workflow.run_tick().await.unwrap_err();
                match err {
                    WorkflowError::RunFailure { ref unit, tick: 1, ref source } => {
                        assert_eq!(unit, "overreach");
                        assert!(
                            matches!(
                                source,
                                UnitError::Memory(MemoryError::WorkSizeExceeded {
                                    work_size: 8,
                                    len: 4,
                                    ..
                                })
                            ),
                            "{}: {:?}",
                            backend.kind(),
                            source
                        );
                    }
                    other => panic!("unexpected error {:?}", other),
                }
                assert_eq!(workflow.read_output("overreach", "output").unwrap(), vec![0.0; 4]);
                assert_eq!(workflow.read_output("source", "output").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
                assert_eq!(workflow.device_allocations(), 0);
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_interrupted_launch_leaves_outputs_consistent_on_every_backend() {
        let registry = Arc::new(BackendRegistry::with_builtin());
        for_each_backend(&registry, true, |backend| {
            let registry = registry.clone();
            async move {
                let mut workflow = Workflow::new().with_registry(registry);
                workflow
                    .add_unit(
                        "interrupted",
                        Box::new(Interrupted {
                            kind: backend.kind().to_string(),
                            kernels: None,
                        }),
                    )
                    .unwrap();
                workflow.initialize().await.unwrap();

                let err = workflow.run_tick().await.unwrap_err();
                assert!(matches!(
                    err,
                    WorkflowError::RunFailure { ref unit, tick: 1, .. } if unit == "interrupted"
                ));
                assert!(matches!(err.backend_error(), Some(BackendError::Launch { .. })));

                // A host kernel writes in place before failing; a device
                // kernel's partial output is never observed.
                let (out, doubled) = if backend.is_host_resident() {
                    (vec![99.0, 5.0, 5.0], vec![198.0, 10.0, 10.0])
                } else {
                    (vec![5.0, 5.0, 5.0], vec![10.0, 10.0, 10.0])
                };
                assert_eq!(workflow.read_output("interrupted", "out").unwrap(), out, "{}", backend.kind());
                assert_eq!(
                    workflow.read_output("interrupted", "doubled").unwrap(),
                    doubled,
                    "{}",
                    backend.kind()
                );
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_unknown_backend_fails_initialization_naming_unit() {
        let log = event_log();
        let mut workflow = Workflow::new();
        workflow
            .add_unit("first", Box::new(RecordingUnit::new("first", &[], &log)))
            .unwrap();
        workflow
            .add_unit(
                "accel",
                Box::new(ScaleUnit::new(2.0).on_backend(BackendRequest::new("gpu-x", 0))),
            )
            .unwrap();
        workflow.link("accel", "input", "first", "out").unwrap();

        let err = workflow.initialize().await.unwrap_err();
        match &err {
            WorkflowError::Initialization { unit, source } => {
                assert_eq!(unit, "accel");
                assert!(matches!(
                    source,
                    UnitError::Backend(BackendError::Unavailable { kind, .. }) if kind == "gpu-x"
                ));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.backend_error().is_some());
        assert!(events(&log).is_empty(), "no unit may be initialized");
    }

    #[tokio::test]
    async fn test_fixed_shape_conflict_fails_at_link() {
        let mut workflow = Workflow::new();
        let nine = vec![0.0; 9];
        workflow
            .add_unit("left", Box::new(SourceUnit::with_shape(nine.clone(), vec![3, 3]).unwrap()))
            .unwrap();
        workflow
            .add_unit("right", Box::new(SourceUnit::with_shape(nine, vec![3, 3]).unwrap()))
            .unwrap();
        workflow
            .add_unit(
                "consumer",
                Box::new(FixedInput {
                    shape: Shape::new(vec![3, 4]),
                    dtype: None,
                }),
            )
            .unwrap();

        for producer in ["left", "right"] {
            let err = workflow.link("consumer", "input", producer, "output").unwrap_err();
            assert!(matches!(
                err,
                WorkflowError::ShapeMismatch { ref expected, ref actual, .. }
                    if expected == &Shape::new(vec![3, 4]) && actual == &Shape::new(vec![3, 3])
            ));
        }
        assert_eq!(workflow.state(), WorkflowState::Built);
    }

    #[tokio::test]
    async fn test_dtype_conflict_fails_at_link() {
        let mut workflow = Workflow::new();
        workflow
            .add_unit("source", Box::new(SourceUnit::new(vec![1.0]).with_dtype(DType::F64)))
            .unwrap();
        workflow
            .add_unit(
                "consumer",
                Box::new(FixedInput {
                    shape: Shape::vector(1),
                    dtype: Some(DType::F32),
                }),
            )
            .unwrap();
        let err = workflow.link("consumer", "input", "source", "output").unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::LinkTypeError {
                expected: DType::F32,
                actual: DType::F64,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_before_any_initialize() {
        let log = event_log();
        let mut workflow = Workflow::new();
        workflow
            .add_unit("a", Box::new(RecordingUnit::new("a", &["input"], &log)))
            .unwrap();
        workflow
            .add_unit("b", Box::new(RecordingUnit::new("b", &["input"], &log)))
            .unwrap();
        workflow.link("a", "input", "b", "out").unwrap();
        workflow.link("b", "input", "a", "out").unwrap();

        let err = workflow.initialize().await.unwrap_err();
        match err {
            WorkflowError::CyclicDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(events(&log).is_empty());
        assert_eq!(workflow.state(), WorkflowState::Linked);
    }

    #[tokio::test]
    async fn test_order_follows_dependencies_then_declaration() {
        let log = event_log();
        let mut workflow = Workflow::new();
        // Declared out of dependency order on purpose.
        workflow
            .add_unit("join", Box::new(RecordingUnit::new("join", &["l", "r"], &log)))
            .unwrap();
        workflow
            .add_unit("right", Box::new(RecordingUnit::new("right", &["input"], &log)))
            .unwrap();
        workflow
            .add_unit("left", Box::new(RecordingUnit::new("left", &["input"], &log)))
            .unwrap();
        workflow
            .add_unit("root", Box::new(RecordingUnit::new("root", &[], &log)))
            .unwrap();
        workflow.link("left", "input", "root", "out").unwrap();
        workflow.link("right", "input", "root", "out").unwrap();
        workflow.link("join", "l", "left", "out").unwrap();
        workflow.link("join", "r", "right", "out").unwrap();

        assert_eq!(workflow.order().unwrap(), vec!["root", "right", "left", "join"]);

        workflow.initialize().await.unwrap();
        workflow.run_tick().await.unwrap();
        assert_eq!(
            events(&log),
            vec![
                "init:root", "init:right", "init:left", "init:join",
                "run:root", "run:right", "run:left", "run:join",
            ]
        );
        // root = 1, left = right = 2, join = 2 + 2 + 1
        assert_eq!(workflow.read_output("join", "out").unwrap(), vec![5.0]);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_deterministic() {
        let mut results = Vec::new();
        for _ in 0..3 {
            let log = event_log();
            let mut workflow = chain(&log, &["a", "b", "c", "d"]);
            workflow.initialize().await.unwrap();
            workflow.run(3).await.unwrap();
            results.push((events(&log), workflow.materialize_outputs().unwrap()));
            workflow.stop().await.unwrap();
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0].1["d"]["out"], serde_json::json!([4.0]));
    }

    #[tokio::test]
    async fn test_unlinked_input_is_rejected() {
        let log = event_log();
        let mut workflow = Workflow::new();
        workflow
            .add_unit("lonely", Box::new(RecordingUnit::new("lonely", &["input"], &log)))
            .unwrap();
        let err = workflow.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::UnlinkedInput { ref unit, ref slot } if unit == "lonely" && slot == "input"
        ));
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn test_construction_errors() {
        let log = event_log();
        let mut workflow = chain(&log, &["a", "b"]);
        assert!(matches!(
            workflow.add_unit("a", Box::new(SumUnit::new())),
            Err(WorkflowError::DuplicateUnit { .. })
        ));
        assert!(matches!(
            workflow.link("b", "input", "ghost", "out"),
            Err(WorkflowError::UnknownUnit { .. })
        ));
        assert!(matches!(
            workflow.link("b", "nope", "a", "out"),
            Err(WorkflowError::UnknownSlot { ref slot, .. }) if slot == "nope"
        ));
        assert!(matches!(
            workflow.link("b", "input", "a", "missing"),
            Err(WorkflowError::UnknownSlot { ref unit, .. }) if unit == "a"
        ));
    }

    #[tokio::test]
    async fn test_relink_replaces_previous_edge() {
        let mut workflow = Workflow::new();
        workflow.add_unit("one", Box::new(SourceUnit::new(vec![1.0, 1.0]))).unwrap();
        workflow.add_unit("two", Box::new(SourceUnit::new(vec![2.0, 2.0]))).unwrap();
        workflow.add_unit("total", Box::new(SumUnit::new())).unwrap();
        workflow.link("total", "input", "one", "output").unwrap();
        workflow.link("total", "input", "two", "output").unwrap();

        workflow.initialize().await.unwrap();
        workflow.run_tick().await.unwrap();
        assert_eq!(workflow.read_output("total", "sum").unwrap(), vec![4.0]);
    }

    #[tokio::test]
    async fn test_run_failure_reports_unit_and_tick_then_stops() {
        let log = event_log();
        let mut workflow = chain(&log, &["a", "b"]);
        workflow
            .add_unit("flaky", Box::new(FailingUnit::new("flaky", FailAt::Tick(2), &log)))
            .unwrap();
        workflow.initialize().await.unwrap();

        let err = workflow.run(5).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::RunFailure { ref unit, tick: 2, .. } if unit == "flaky"
        ));
        assert_eq!(workflow.state(), WorkflowState::Stopped);
        assert_eq!(workflow.tick(), 2);

        let tail: Vec<String> = events(&log).into_iter().rev().take(3).collect();
        assert_eq!(tail, vec!["stop:a", "stop:b", "stop:flaky"]);
        assert!(matches!(
            workflow.run_tick().await,
            Err(WorkflowError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_initialize_failure_stops_initialized_units_in_reverse() {
        let log = event_log();
        let mut workflow = chain(&log, &["a", "b"]);
        workflow
            .add_unit("broken", Box::new(FailingUnit::new("broken", FailAt::Initialize, &log)))
            .unwrap();

        let err = workflow.initialize().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Initialization { ref unit, .. } if unit == "broken"));
        assert_eq!(events(&log), vec!["init:a", "init:b", "stop:b", "stop:a"]);
        assert_eq!(workflow.state(), WorkflowState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_runs_in_reverse_order_and_reports_failure() {
        let log = event_log();
        let mut workflow = Workflow::new();
        workflow
            .add_unit("sticky", Box::new(FailingUnit::new("sticky", FailAt::Stop, &log)))
            .unwrap();
        workflow
            .add_unit("after", Box::new(RecordingUnit::new("after", &["input"], &log)))
            .unwrap();
        workflow.link("after", "input", "sticky", "out").unwrap();
        workflow.initialize().await.unwrap();
        workflow.run_tick().await.unwrap();

        let err = workflow.stop().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Teardown { ref unit, .. } if unit == "sticky"));
        let tail: Vec<String> = events(&log).into_iter().rev().take(2).collect();
        assert_eq!(tail, vec!["stop:sticky", "stop:after"]);
        assert_eq!(workflow.state(), WorkflowState::Stopped);
        assert!(workflow.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_unit_timeout() {
        let mut workflow = Workflow::new().with_unit_timeout(Duration::from_millis(20));
        workflow
            .add_unit("sleepy", Box::new(SlowUnit::new(Duration::from_millis(500))))
            .unwrap();
        workflow.initialize().await.unwrap();

        let err = workflow.run_tick().await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::RunFailure {
                source: UnitError::Timeout(_),
                ..
            }
        ));
        assert_eq!(workflow.state(), WorkflowState::Stopped);
    }

    #[tokio::test]
    async fn test_timeout_from_settings() {
        let settings = Settings::from_yaml_str("engine:\n  unit_timeout_ms: 10\n").unwrap();
        let mut workflow = Workflow::with_settings(settings);
        workflow
            .add_unit("sleepy", Box::new(SlowUnit::new(Duration::from_millis(500))))
            .unwrap();
        workflow.initialize().await.unwrap();
        assert!(workflow.run(1).await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_inside_tick() {
        let log = event_log();
        let mut workflow = Workflow::new();
        let token = workflow.cancellation_token();
        workflow
            .add_unit("canceller", Box::new(CancellingUnit::new(token, 2)))
            .unwrap();
        workflow
            .add_unit("worker", Box::new(RecordingUnit::new("worker", &[], &log)))
            .unwrap();
        workflow.initialize().await.unwrap();

        let err = workflow.run(5).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled { tick: 2 }));
        assert_eq!(workflow.state(), WorkflowState::Stopped);
        let runs = events(&log).iter().filter(|e| *e == "run:worker").count();
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_ticks_keeps_completed_count() {
        let log = event_log();
        let mut workflow = Workflow::new();
        let token = workflow.cancellation_token();
        workflow
            .add_unit("worker", Box::new(RecordingUnit::new("worker", &[], &log)))
            .unwrap();
        workflow
            .add_unit("canceller", Box::new(CancellingUnit::new(token, 2)))
            .unwrap();
        workflow.initialize().await.unwrap();

        assert_eq!(workflow.run(5).await.unwrap(), 2);
        assert_eq!(workflow.state(), WorkflowState::Stopped);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_tick() {
        let log = event_log();
        let mut workflow = chain(&log, &["a"]);
        workflow.initialize().await.unwrap();
        workflow.cancellation_token().cancel();

        assert!(matches!(
            workflow.run(3).await,
            Err(WorkflowError::Cancelled { tick: 0 })
        ));
        assert_eq!(events(&log), vec!["init:a", "stop:a"]);
    }

    #[tokio::test]
    async fn test_write_to_foreign_buffer_is_rejected() {
        let mut workflow = Workflow::new();
        workflow.add_unit("source", Box::new(SourceUnit::new(vec![1.0; 4]))).unwrap();
        let victim = workflow.output_id("source", "output").unwrap();
        workflow
            .add_unit("intruder", Box::new(Trespasser { victim }))
            .unwrap();
        workflow.link("intruder", "input", "source", "output").unwrap();
        workflow.initialize().await.unwrap();

        let err = workflow.run_tick().await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::RunFailure {
                source: UnitError::Memory(MemoryError::NotOwned { .. }),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_deferred_output_takes_input_shape() {
        let mut workflow = Workflow::new();
        workflow
            .add_unit(
                "grid",
                Box::new(SourceUnit::with_shape(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap()),
            )
            .unwrap();
        workflow.add_unit("half", Box::new(ScaleUnit::new(0.5))).unwrap();
        workflow.link("half", "input", "grid", "output").unwrap();

        let id = workflow.output_id("half", "output").unwrap();
        assert_eq!(workflow.buffer(id).unwrap().len(), 0);
        workflow.initialize().await.unwrap();
        assert_eq!(workflow.buffer(id).unwrap().shape(), &Shape::new(vec![2, 3]));

        workflow.run_tick().await.unwrap();
        let outputs = workflow.materialize_outputs().unwrap();
        assert_eq!(outputs["half"]["output"], serde_json::json!([[0.5, 1.0, 1.5], [2.0, 2.5, 3.0]]));
    }

    #[tokio::test]
    async fn test_device_output_stays_on_device_until_read() {
        let registry = Arc::new(BackendRegistry::with_builtin());
        let mut workflow = doubling_workflow(registry.clone(), Some("wasm"));
        workflow.initialize().await.unwrap();
        workflow.run_tick().await.unwrap();

        let id = workflow.output_id("double", "output").unwrap();
        let backend = workflow.backend_of("double").unwrap().unwrap().clone();
        assert_eq!(
            workflow.buffer(id).unwrap().residency(),
            &Residency::DeviceAhead(backend.id().clone())
        );
        assert_eq!(workflow.read_output("double", "output").unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
        assert_eq!(workflow.buffer(id).unwrap().residency(), &Residency::Synced);

        workflow.reset_buffers().unwrap();
        assert_eq!(backend.live_allocations(), 0);
        workflow.run_tick().await.unwrap();
        assert_eq!(workflow.read_output("double", "output").unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
        workflow.stop().await.unwrap();
        assert_eq!(backend.live_allocations(), 0);
    }

    #[tokio::test]
    async fn test_auto_backend_follows_settings() {
        let registry = Arc::new(BackendRegistry::with_builtin());
        let settings = Settings::from_yaml_str("engine:\n  backend: wasm\n").unwrap();
        let mut workflow = Workflow::with_settings(settings).with_registry(registry);
        workflow.add_unit("a", Box::new(SourceUnit::new(vec![1.0, 2.0]))).unwrap();
        workflow.add_unit("b", Box::new(SourceUnit::new(vec![3.0, 4.0]))).unwrap();
        workflow.add_unit("sum", Box::new(AddUnit::new(BackendRequest::auto()))).unwrap();
        workflow.link("sum", "a", "a", "output").unwrap();
        workflow.link("sum", "b", "b", "output").unwrap();

        workflow.initialize().await.unwrap();
        assert_eq!(workflow.backend_of("sum").unwrap().unwrap().kind(), "wasm");
        workflow.run_tick().await.unwrap();
        assert_eq!(workflow.read_output("sum", "output").unwrap(), vec![4.0, 6.0]);
        workflow.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_backend_defaults_without_settings() {
        let mut workflow = Workflow::new().with_registry(Arc::new(BackendRegistry::with_builtin()));
        workflow.add_unit("a", Box::new(SourceUnit::new(vec![1.0]))).unwrap();
        workflow.add_unit("b", Box::new(SourceUnit::new(vec![2.0]))).unwrap();
        workflow.add_unit("sum", Box::new(AddUnit::new(BackendRequest::auto()))).unwrap();
        workflow.link("sum", "a", "a", "output").unwrap();
        workflow.link("sum", "b", "b", "output").unwrap();

        workflow.initialize().await.unwrap();
        assert_eq!(
            workflow.backend_of("sum").unwrap().unwrap().kind(),
            crate::config::consts::DEFAULT_BACKEND
        );
        workflow.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_units_share_one_backend_and_kernel_cache() {
        let registry = Arc::new(BackendRegistry::with_builtin());
        let mut workflow = doubling_workflow(registry, Some("wasm"));
        workflow
            .add_unit("again", Box::new(ScaleUnit::new(2.0).on_backend(BackendRequest::new("wasm", 0))))
            .unwrap();
        workflow.link("again", "input", "double", "output").unwrap();
        workflow.initialize().await.unwrap();

        let first = workflow.backend_of("double").unwrap().unwrap().clone();
        let second = workflow.backend_of("again").unwrap().unwrap().clone();
        assert!(first.same_instance(&second));
        assert_eq!(first.compilations(), 1);

        workflow.run_tick().await.unwrap();
        assert_eq!(workflow.read_output("again", "output").unwrap(), vec![4.0, 8.0, 12.0, 16.0]);
        workflow.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_compile_error_surfaces_at_initialize() {
        struct BadKernel;

        #[async_trait]
        impl Unit for BadKernel {
            fn type_name(&self) -> &'static str {
                "bad_kernel"
            }
            fn declare_inputs(&self) -> Vec<SlotSpec> {
                Vec::new()
            }
            fn declare_outputs(&self) -> Vec<SlotSpec> {
                Vec::new()
            }
            fn backend_request(&self) -> Option<BackendRequest> {
                Some(BackendRequest::new("wasm", 0))
            }
            async fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), UnitError> {
                ctx.compile(&KernelSource::new("broken").with_wasm("(module (func"))?;
                Ok(())
            }
            async fn run(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
                Ok(())
            }
        }

        let mut workflow = Workflow::new().with_registry(Arc::new(BackendRegistry::with_builtin()));
        workflow.add_unit("bad", Box::new(BadKernel)).unwrap();
        let err = workflow.initialize().await.unwrap_err();
        match err.backend_error() {
            Some(BackendError::Compile {
                kernel, source_text, ..
            }) => {
                assert_eq!(kernel, "broken");
                assert_eq!(source_text, "(module (func");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_state_guards() {
        let log = event_log();
        let mut workflow = chain(&log, &["a"]);
        assert!(matches!(
            workflow.run_tick().await,
            Err(WorkflowError::InvalidState { .. })
        ));
        workflow.initialize().await.unwrap();
        assert_eq!(workflow.state(), WorkflowState::Initialized);
        assert!(matches!(
            workflow.add_unit("late", Box::new(SumUnit::new())),
            Err(WorkflowError::InvalidState { .. })
        ));
        assert!(matches!(
            workflow.initialize().await,
            Err(WorkflowError::InvalidState { .. })
        ));
    }
}
