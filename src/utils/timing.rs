use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: HashMap<String, Instant>,
    phase_durations: BTreeMap<String, Duration>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: BTreeMap::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), Instant::now());
    }

    /// 结束一个阶段的计时，未开始的阶段返回 None
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let start_time = self.phase_start_times.remove(phase_name)?;
        let duration = start_time.elapsed();
        self.phase_durations
            .insert(phase_name.to_string(), duration);
        Some(duration)
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 导出可序列化的计时结果
    pub fn report(&self) -> TimingReport {
        TimingReport {
            total_ms: duration_ms(self.get_total_duration()),
            phases: self
                .phase_durations
                .iter()
                .map(|(phase, duration)| (phase.clone(), duration_ms(*duration)))
                .collect(),
        }
    }
}

/// 计时结果（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingReport {
    pub total_ms: f64,
    pub phases: BTreeMap<String, f64>,
}

impl TimingReport {
    pub fn phase_ms(&self, phase: &str) -> Option<f64> {
        self.phases.get(phase).copied()
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!("总执行时间: {:.2}秒\n", self.total_ms / 1000.0);

        if !self.phases.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, ms) in &self.phases {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, ms / 1000.0));
            }
        }

        report
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const TOTAL: &'static str = "total";
    pub const LLM_PLANNING: &'static str = "llm_planning";
    pub const PROCESS_NODES: &'static str = "process_nodes";
    pub const PROCESS_ROOT: &'static str = "process_root";

    pub const NODE_EXECUTION: &'static str = "node_execution";
    pub const QUESTION_ADJUSTMENT: &'static str = "question_adjustment";

    pub const LINK_SEARCH: &'static str = "link_search";
    pub const PAGE_FETCH: &'static str = "page_fetch";
    pub const ANSWER_SYNTHESIS: &'static str = "answer_synthesis";

    pub fn query_building(attempt: usize) -> String {
        format!("query_building_attempt_{}", attempt)
    }

    pub fn search_execution(attempt: usize) -> String {
        format!("search_execution_attempt_{}", attempt)
    }
}
