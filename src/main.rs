use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use swarmsim::config::SimulationDocument;
use swarmsim::export;
use swarmsim::geometry::{Route, build_arc_trajectory, build_trajectory, compute_frames_with, compute_radial_frames};
use swarmsim::logging::{LogConfig, LogOutput, init_logging, level_from_verbosity, parse_log_level};
use swarmsim::orientation;
use swarmsim::simulation::{SimulationEngine, TracingObserver};
use swarmsim::synthesis::{PathSynthesizer, SearchOutcome};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn build_cli() -> Command {
    Command::new("swarmsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("群巡回シミュレーション (Swarm Patrol Simulation)")
        .long_about(
            "自律エージェント群の巡回シミュレーションと軌道の姿勢制約検証を行います。\n\
             設定ファイル(.yaml)が存在しない場合は既定の設定で実行されます。",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .default_value("swarmsim.yaml")
                .help("設定ファイル(.yaml)のパス"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("詳細出力レベル (-v: DEBUG, -vv: TRACE)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .global(true)
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .subcommand(
            Command::new("simulate")
                .about("群巡回シミュレーションを実行")
                .arg(
                    Arg::new("steps")
                        .short('n')
                        .long("steps")
                        .value_parser(clap::value_parser!(u64))
                        .help("ステップ数（設定ファイルの値を上書き）"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(clap::value_parser!(u64))
                        .help("乱数シード（設定ファイルの値を上書き）"),
                )
                .arg(
                    Arg::new("headless")
                        .long("headless")
                        .action(ArgAction::SetTrue)
                        .help("ステップ間の待機を行わない"),
                )
                .arg(
                    Arg::new("metrics-csv")
                        .long("metrics-csv")
                        .value_name("FILE")
                        .help("ステップ記録CSVの出力先"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_name("FILE")
                        .help("最終レポートJSONの出力先"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("姿勢制約を満たす経路を探索")
                .arg(
                    Arg::new("routes")
                        .short('r')
                        .long("routes")
                        .value_parser(clap::value_parser!(usize))
                        .help("探索する経路の本数"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(clap::value_parser!(u64))
                        .help("乱数シード"),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .value_name("FILE")
                        .help("発見した軌道をCSVに出力"),
                ),
        )
        .subcommand(
            Command::new("analyze")
                .about("設定ファイルの固定経路の姿勢を解析")
                .arg(
                    Arg::new("arc")
                        .long("arc")
                        .action(ArgAction::SetTrue)
                        .help("円弧補間と放射方向フレームを使用"),
                )
                .arg(
                    Arg::new("alpha")
                        .long("alpha")
                        .value_parser(clap::value_parser!(f64))
                        .help("鉛直補正重み α (0-1)"),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .value_name("FILE")
                        .help("軌道をCSVに出力"),
                ),
        )
        .subcommand(Command::new("info").about("設定の概要を表示して終了"))
}

fn main() {
    let matches = build_cli().get_matches();

    let output = match LogOutput::from_str(
        matches
            .get_one::<String>("log-output")
            .map(String::as_str)
            .unwrap_or("console"),
    ) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };
    let base_level = parse_log_level(matches.get_one::<String>("log-level").map_or("info", String::as_str));
    let log_config = LogConfig {
        level: level_from_verbosity(base_level, matches.get_count("verbose")),
        output,
        ..LogConfig::default()
    };
    // ガードはプロセス終了まで保持
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化エラー: {}", e);
            std::process::exit(1);
        }
    };

    let config_path = matches
        .get_one::<String>("config")
        .map_or("swarmsim.yaml", String::as_str);

    let result = match matches.subcommand() {
        Some(("simulate", sub)) => run_simulation(config_path, sub),
        Some(("plan", sub)) => run_plan(config_path, sub),
        Some(("analyze", sub)) => run_analyze(config_path, sub),
        Some(("info", _)) => SimulationDocument::load(config_path)
            .map(|doc| doc.print_summary())
            .map_err(Into::into),
        _ => Ok(()),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// Ctrl-C で中断フラグを立てるタスクを起動
///
/// 返されたランタイムを保持している間だけシグナルを監視します。
fn spawn_interrupt_watcher(flag: Arc<AtomicBool>) -> std::io::Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl-C を受信しました。現在のステップ終了後に停止します");
                flag.store(true, Ordering::SeqCst);
            }
            Err(e) => warn!("シグナル監視を開始できません: {}", e),
        }
    });
    Ok(runtime)
}

/// シミュレーションの実行
fn run_simulation(config_path: &str, args: &ArgMatches) -> CliResult {
    let mut doc = SimulationDocument::load(config_path)?;
    if let Some(&steps) = args.get_one::<u64>("steps") {
        doc.sim.steps = steps;
    }
    if let Some(&seed) = args.get_one::<u64>("seed") {
        doc.sim.seed = seed;
    }
    if let Some(path) = args.get_one::<String>("metrics-csv") {
        doc.output.metrics_csv = Some(path.clone());
    }
    if let Some(path) = args.get_one::<String>("report") {
        doc.output.report_json = Some(path.clone());
    }
    let headless = args.get_flag("headless");

    doc.print_summary();
    println!();

    let interrupt = Arc::new(AtomicBool::new(false));
    let _watcher = spawn_interrupt_watcher(interrupt.clone())?;

    let steps = doc.sim.steps;
    let output = doc.output.clone();
    let mut engine = SimulationEngine::new(doc, interrupt, headless);
    engine.add_observer(Box::new(TracingObserver));
    engine.initialize()?;
    let summary = engine.run(steps);

    // 出力の失敗はログに残して継続
    if let Some(path) = &output.metrics_csv {
        match export::write_metrics_csv(Path::new(path), engine.collector().records()) {
            Ok(rows) => info!("ステップ記録を出力しました: {} ({}行)", path, rows),
            Err(e) => warn!("ステップ記録の出力に失敗: {}", e),
        }
    }
    if let Some(path) = &output.trajectory_csv {
        let routes = engine.planned_routes().iter().map(|(id, t)| (*id as usize, t));
        match export::write_trajectory_csv(Path::new(path), routes) {
            Ok(rows) => info!("計画経路を出力しました: {} ({}行)", path, rows),
            Err(e) => warn!("計画経路の出力に失敗: {}", e),
        }
    }

    let report = engine.report(&summary);
    if let Some(path) = &output.report_json {
        match report.write_json(Path::new(path)) {
            Ok(()) => info!("最終レポートを出力しました: {}", path),
            Err(e) => warn!("最終レポートの出力に失敗: {}", e),
        }
    }

    println!("=== 実行結果 ===");
    println!(
        "完了ステップ: {}{}",
        summary.steps_completed,
        if summary.interrupted { " (中断)" } else { "" }
    );
    println!("最終カバレッジ: {:.1}%", report.final_coverage * 100.0);
    println!("平均巡回効率: {:.3}", report.mean_efficiency);
    println!("回収済み目標: {}個", summary.targets_collected);
    if let Some(r) = report.final_resilience {
        println!(
            "レジリエンス: 総合 {:.3} (構造 {:.3}, エネルギー {:.3}, 適応 {:.3})",
            r.overall, r.structural, r.energy, r.adaptive
        );
    }
    for agent in &report.agents {
        println!(
            "  {} {}: 移動 {}回, 距離 {:.1}, 最多行動 {}, 残エネルギー {:.1}",
            agent.id,
            agent.profile,
            agent.moves,
            agent.distance,
            agent.most_common_decision.as_deref().unwrap_or("-"),
            agent.final_energy
        );
    }
    Ok(())
}

/// 経路探索
fn run_plan(config_path: &str, args: &ArgMatches) -> CliResult {
    let doc = SimulationDocument::load(config_path)?;
    let routes = args.get_one::<usize>("routes").copied().unwrap_or(doc.search.routes).max(1);
    let seed = args.get_one::<u64>("seed").copied().unwrap_or(doc.sim.seed);

    println!("=== 経路探索 ===");
    println!("探索中心: {:?}", doc.search.center.to_array());
    println!("経路本数: {}, シード値: {}", routes, seed);
    println!();

    let mut synthesizer = PathSynthesizer::new(doc.search.clone(), doc.constraints, seed);
    let outcomes = synthesizer.find_routes(routes);

    let mut found = Vec::new();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            SearchOutcome::Found(route) => {
                let v = &route.validation;
                println!(
                    "経路 {}: 発見 (試行 {} 回, スケール {:.3}, 長さ {:.2})",
                    i,
                    route.attempts,
                    route.scale,
                    route.trajectory.arc_length()
                );
                println!(
                    "  最大変化量 roll/pitch/yaw: {:.2}/{:.2}/{:.2}",
                    v.max_delta_roll, v.max_delta_pitch, v.max_delta_yaw
                );
                found.push((i, route.trajectory));
            }
            SearchOutcome::NotFound(exhausted) => {
                println!(
                    "経路 {}: 見つかりません (試行 {} 回, 最終スケール {:.3})",
                    i, exhausted.attempts, exhausted.final_scale
                );
            }
        }
    }

    let export_path = args.get_one::<String>("export").or(doc.output.trajectory_csv.as_ref());
    if let Some(path) = export_path {
        let rows = export::write_trajectory_csv(Path::new(path), found.iter().map(|(i, t)| (*i, t)))?;
        println!("軌道を出力しました: {} ({}行)", path, rows);
    }
    Ok(())
}

/// 固定経路の姿勢解析
fn run_analyze(config_path: &str, args: &ArgMatches) -> CliResult {
    let doc = SimulationDocument::load(config_path)?;
    let alpha = args.get_one::<f64>("alpha").copied().unwrap_or(doc.search.correction_weight);
    if !(0.0..=1.0).contains(&alpha) {
        return Err(format!("補正重みは0から1の間である必要があります: {}", alpha).into());
    }

    let route = Route::new(doc.route.waypoints.clone())?;
    let (trajectory, frames) = if args.get_flag("arc") {
        let per_segment = (doc.route.resolution / route.len().saturating_sub(1).max(1)).max(2);
        let arc = build_arc_trajectory(&route, per_segment)?;
        let frames = compute_radial_frames(&arc);
        (arc.trajectory, frames)
    } else {
        let trajectory = build_trajectory(&route, doc.route.resolution)?;
        let frames = compute_frames_with(&trajectory, doc.search.up_hint, alpha);
        (trajectory, frames)
    };

    let analysis = orientation::analyze_with_up(&frames, doc.search.up_hint, &doc.constraints);
    let v = &analysis.validation;

    println!("=== 姿勢解析 ===");
    println!(
        "補間: {}, サンプル数: {}, 長さ: {:.2}",
        if args.get_flag("arc") { "円弧" } else { "3次スプライン" },
        trajectory.len(),
        trajectory.arc_length()
    );
    println!("最大絶対角 roll/pitch/yaw: {:.2}/{:.2}/{:.2}", v.max_abs_roll, v.max_abs_pitch, v.max_abs_yaw);
    println!(
        "最大変化量 roll/pitch/yaw: {:.2}/{:.2}/{:.2}",
        v.max_delta_roll, v.max_delta_pitch, v.max_delta_yaw
    );
    println!("鉛直からの傾き: 平均 {:.2}°, 最大 {:.2}°", analysis.tilt.mean_deg, analysis.tilt.max_deg);
    if v.ok {
        println!("判定: 制約を満たしています");
    } else {
        println!("判定: 制約違反 ({})", v.violations(&doc.constraints).join(", "));
    }

    if let Some(path) = args.get_one::<String>("export") {
        let rows = export::write_trajectory_csv(Path::new(path), [(0, &trajectory)])?;
        println!("軌道を出力しました: {} ({}行)", path, rows);
    }
    Ok(())
}
