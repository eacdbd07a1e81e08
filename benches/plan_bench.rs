// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for command planning: spec parsing, plan construction, and
//! Windows command-line joining. Planning never touches the filesystem,
//! so synthetic layouts are enough.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use runlet_core::{CommandSpec, Platform};
use runlet_env::{CondaLayout, ResolvedEnv};
use runlet_exec::{join_cmdline, PlanBuilder};
use std::path::PathBuf;

// ── Helpers ─────────────────────────────────────────────────────────────

fn windows_layout() -> CondaLayout {
    let root = PathBuf::from(r"C:\Miniconda3");
    CondaLayout {
        exe: Some(root.join("condabin").join("conda.bat")),
        root: Some(root.clone()),
        scripts_dir: Some(root.join("Scripts")),
        condabin_dir: Some(root.join("condabin")),
        library_bin_dir: Some(root.join("Library").join("bin")),
        activate_script: Some(root.join("condabin").join("activate.bat")),
    }
}

fn posix_layout() -> CondaLayout {
    let root = PathBuf::from("/opt/miniconda3");
    CondaLayout {
        exe: Some(root.join("bin").join("conda")),
        root: Some(root),
        ..CondaLayout::default()
    }
}

fn child_env() -> ResolvedEnv {
    [
        ("PATH", "/opt/miniconda3/bin:/usr/bin:/bin"),
        ("HOME", "/home/dev"),
        ("LANG", "en_US.UTF-8"),
        ("PYTHONUTF8", "1"),
        ("PYTHONIOENCODING", "utf-8"),
        ("PYTHONUNBUFFERED", "1"),
        ("CONDA_ROOT", "/opt/miniconda3"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn argv_spec(args: usize) -> CommandSpec {
    let mut argv = vec!["python".to_string(), "script.py".to_string()];
    argv.extend((0..args).map(|n| format!("--flag-{n}=value {n}")));
    CommandSpec::argv(argv)
}

// ── Spec parsing ────────────────────────────────────────────────────────

fn bench_to_argv(c: &mut Criterion) {
    let mut group = c.benchmark_group("spec_to_argv");

    let line = CommandSpec::line("python train.py --epochs 20 --name 'run one' --out \"a b\"");
    group.bench_function("shell_line", |b| {
        b.iter(|| black_box(&line).to_argv().unwrap());
    });

    let argv = argv_spec(8);
    group.bench_function("argv", |b| {
        b.iter(|| black_box(&argv).to_argv().unwrap());
    });

    group.finish();
}

// ── Plan construction ───────────────────────────────────────────────────

fn bench_plan_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");

    let posix = PlanBuilder::new(Platform::Posix);
    let posix_layout = posix_layout();
    for args in [1, 8, 32, 128] {
        let spec = argv_spec(args);
        group.bench_with_input(BenchmarkId::new("plain_args", args), &spec, |b, spec| {
            b.iter(|| {
                posix
                    .build(black_box(spec), &posix_layout, child_env())
                    .unwrap()
            });
        });
    }

    let windows = PlanBuilder::new(Platform::Windows);
    let windows_layout = windows_layout();

    let manager = CommandSpec::argv(["conda", "install", "-y", "numpy", "pandas"]);
    group.bench_function("windows_activation_script", |b| {
        b.iter(|| {
            windows
                .build(black_box(&manager), &windows_layout, child_env())
                .unwrap()
        });
    });

    let manager_run = CommandSpec::argv(["conda", "run", "-n", "base", "python", "-V"]);
    group.bench_function("windows_manager_run", |b| {
        b.iter(|| {
            windows
                .build(black_box(&manager_run), &windows_layout, child_env())
                .unwrap()
        });
    });

    group.finish();
}

// ── Windows command-line joining ────────────────────────────────────────

fn bench_join_cmdline(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_cmdline");

    for count in [1, 5, 10, 20] {
        let argv: Vec<String> = (0..count)
            .map(|n| format!("arg with \"quotes\" and \\back\\slashes {n}"))
            .collect();
        group.bench_with_input(BenchmarkId::new("args", count), &argv, |b, argv| {
            b.iter(|| join_cmdline(black_box(argv)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_to_argv, bench_plan_build, bench_join_cmdline);
criterion_main!(benches);
