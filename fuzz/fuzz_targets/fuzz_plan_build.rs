// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz plan construction across platforms and layout shapes.
//!
//! Planning is pure, so arbitrary argv can be driven through every
//! layout without touching the filesystem. Verifies:
//! 1. build() never panics and errors only with the two planning codes.
//! 2. A direct invocation always carries a non-empty argv.
//! 3. A script invocation is a well-formed activation wrapper.
//! 4. The plan view serializes.
#![no_main]
use libfuzzer_sys::fuzz_target;
use runlet_core::{CommandSpec, ErrorCode, Platform};
use runlet_env::{CondaLayout, ResolvedEnv};
use runlet_exec::{join_cmdline, Invocation, PlanBuilder, TempScriptPolicy};
use std::path::PathBuf;

fn layouts() -> [CondaLayout; 4] {
    let posix_root = PathBuf::from("/opt/miniconda3");
    let win_root = PathBuf::from(r"C:\Miniconda3");
    [
        CondaLayout::empty(),
        CondaLayout {
            exe: Some(posix_root.join("bin").join("conda")),
            root: Some(posix_root),
            ..CondaLayout::default()
        },
        CondaLayout {
            exe: Some(win_root.join("condabin").join("conda.bat")),
            root: Some(win_root.clone()),
            scripts_dir: Some(win_root.join("Scripts")),
            condabin_dir: Some(win_root.join("condabin")),
            library_bin_dir: Some(win_root.join("Library").join("bin")),
            activate_script: Some(win_root.join("condabin").join("activate.bat")),
        },
        // Windows install with no activate.bat: manager commands fall
        // back to a direct cmd.exe dispatch.
        CondaLayout {
            exe: Some(r"C:\Conda\condabin\conda.bat".into()),
            root: Some(r"C:\Conda".into()),
            ..CondaLayout::default()
        },
    ]
}

fn env() -> ResolvedEnv {
    [("PATH", "/usr/bin"), ("PYTHONUTF8", "1")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fuzz_target!(|input: (Vec<String>, bool, bool)| {
    let (argv, as_line, system_temp) = input;

    let spec = if as_line {
        CommandSpec::line(argv.join(" "))
    } else {
        CommandSpec::argv(argv.clone())
    };

    let policy = if system_temp {
        TempScriptPolicy::SystemTemp
    } else {
        TempScriptPolicy::Colocated
    };

    for platform in [Platform::Posix, Platform::Windows] {
        let builder = PlanBuilder::new(platform).script_policy(policy);
        for layout in layouts() {
            match builder.build(&spec, &layout, env()) {
                Ok(plan) => {
                    // --- Property 1: rendering is total ---
                    let _ = plan.display_line();

                    match &plan.invocation {
                        // --- Property 2: direct argv is never empty ---
                        Invocation::Direct { argv } => {
                            assert!(!argv.is_empty(), "planned argv must not be empty");
                        }
                        // --- Property 3: scripts are activation wrappers ---
                        Invocation::Script { body } => {
                            assert!(body.starts_with("@echo off\r\n"));
                            assert!(body.ends_with("EXIT /B %ERRORLEVEL%\r\n"));
                            assert!(plan.via_shell());
                        }
                    }
                    assert_eq!(plan.script_policy, policy);

                    // --- Property 4: the inspection view serializes ---
                    serde_json::to_string(&plan.view()).expect("plan view must serialize");
                }
                Err(err) => {
                    assert!(
                        matches!(
                            err.code,
                            ErrorCode::InvalidCommand | ErrorCode::ManagerNotFound
                        ),
                        "unexpected planning code: {}",
                        err.code
                    );
                }
            }
        }
    }

    // --- Property 5: cmdline joining is total ---
    let joined = join_cmdline(&argv);
    let plain = argv
        .iter()
        .all(|a| !a.is_empty() && !a.contains([' ', '\t', '"', '\\']));
    if plain {
        assert_eq!(joined, argv.join(" "));
    }
});
