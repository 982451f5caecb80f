//! 批量填充
//!
//! 把 N 个元素划分为互不重叠的连续片段，每个 lane 负责一段，
//! 片段数受任务上限约束。划分方式只影响调度，不影响结果。

use std::ops::Range;

use bytemuck::Zeroable;
use rayon::prelude::*;

/// 每个任务的 lane 数
pub const LANES_PER_TASK: usize = 512;
/// 任务数上限
pub const MAX_TASKS: usize = 2880;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPlan {
    pub tasks: usize,
    pub lanes: usize,
    /// 每个 lane 顺序处理的连续元素数
    pub run_len: usize,
}

impl FillPlan {
    pub fn for_len(n: usize) -> Self {
        Self::with_limits(n, MAX_TASKS, LANES_PER_TASK)
    }

    pub fn with_limits(n: usize, max_tasks: usize, lanes: usize) -> Self {
        let lanes = lanes.max(1);
        let tasks = n.div_ceil(lanes).min(max_tasks.max(1));
        let run_len = if tasks == 0 {
            1
        } else {
            n.div_ceil(tasks * lanes).max(1)
        };
        Self {
            tasks,
            lanes,
            run_len,
        }
    }

    pub fn total_lanes(&self) -> usize {
        self.tasks * self.lanes
    }

    /// 第 `lane` 号（全局）lane 负责的区间，超出 `n` 的部分截断
    pub fn lane_range(&self, lane: usize, n: usize) -> Range<usize> {
        let start = (lane * self.run_len).min(n);
        let end = (start + self.run_len).min(n);
        start..end
    }

    /// 第 `task` 号任务下所有 lane 区间的并集
    pub fn task_range(&self, task: usize, n: usize) -> Range<usize> {
        let first = task * self.lanes;
        let last = first + self.lanes.max(1) - 1;
        self.lane_range(first, n).start..self.lane_range(last, n).end
    }
}

pub fn fill<T: Copy + Send + Sync>(dst: &mut [T], value: T) {
    let plan = FillPlan::for_len(dst.len());
    fill_with_plan(dst, value, plan);
}

/// 每个任务一个 rayon 作业，任务内按 lane 顺序填充各自区间
///
/// `plan` 未覆盖的尾部（计划与长度不匹配时）顺序补齐。
pub fn fill_with_plan<T: Copy + Send + Sync>(dst: &mut [T], value: T, plan: FillPlan) {
    let plan = FillPlan {
        lanes: plan.lanes.max(1),
        run_len: plan.run_len.max(1),
        ..plan
    };
    let n = dst.len();
    let mut rest = dst;
    let mut tasks = Vec::with_capacity(plan.tasks);
    for task in 0..plan.tasks {
        let range = plan.task_range(task, n);
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        tasks.push((task, range.start, head));
        rest = tail;
    }
    rest.fill(value);

    tasks.into_par_iter().for_each(|(task, base, chunk)| {
        for lane in task * plan.lanes..(task + 1) * plan.lanes {
            let range = plan.lane_range(lane, n);
            chunk[range.start - base..range.end - base].fill(value);
        }
    });
}

pub fn fill_zeros<T: Zeroable + Copy + Send + Sync>(dst: &mut [T]) {
    fill(dst, T::zeroed());
}
