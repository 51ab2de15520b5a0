//! Fixed metric vocabulary and service naming conventions
//!
//! Metrics carry two alias sets:
//! - ASCII aliases, compared against whole identifier runs (case-insensitive)
//! - CJK aliases, compared as substrings, since those scripts have no
//!   whitespace between words

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric families recognised in incident text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Processor utilisation
    Cpu,
    /// Memory usage, OOM
    Memory,
    /// Disk space and IO
    Disk,
    /// Network throughput and packet loss
    Network,
    /// Response time and timeouts
    Latency,
    /// Error ratios and status codes
    ErrorRate,
    /// Requests or transactions per second
    Throughput,
    /// Connection counts and pool saturation
    Connections,
    /// Garbage collection pauses
    Gc,
    /// Worker/thread pool saturation
    ThreadPool,
}

impl Metric {
    /// All metrics, in declaration order
    pub const ALL: [Metric; 10] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::Disk,
        Metric::Network,
        Metric::Latency,
        Metric::ErrorRate,
        Metric::Throughput,
        Metric::Connections,
        Metric::Gc,
        Metric::ThreadPool,
    ];

    /// Canonical snake_case name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
            Metric::Network => "network",
            Metric::Latency => "latency",
            Metric::ErrorRate => "error_rate",
            Metric::Throughput => "throughput",
            Metric::Connections => "connections",
            Metric::Gc => "gc",
            Metric::ThreadPool => "thread_pool",
        }
    }

    /// Lowercase ASCII tokens that name this metric
    #[must_use]
    pub const fn ascii_aliases(self) -> &'static [&'static str] {
        match self {
            Metric::Cpu => &["cpu", "processor", "load"],
            Metric::Memory => &["memory", "mem", "ram", "oom", "heap"],
            Metric::Disk => &["disk", "iops", "inode", "inodes", "storage"],
            Metric::Network => &["network", "bandwidth", "packet", "packets", "net"],
            Metric::Latency => &["latency", "timeout", "timeouts", "slow", "rt", "p99"],
            Metric::ErrorRate => &["error", "errors", "5xx", "500", "502", "503", "504"],
            Metric::Throughput => &["qps", "tps", "rps", "throughput"],
            Metric::Connections => &["connection", "connections", "conn", "conns"],
            Metric::Gc => &["gc"],
            Metric::ThreadPool => &["thread", "threads", "threadpool"],
        }
    }

    /// CJK substrings that name this metric
    #[must_use]
    pub const fn cjk_aliases(self) -> &'static [&'static str] {
        match self {
            Metric::Cpu => &["处理器", "负载"],
            Metric::Memory => &["内存", "堆内存", "内存溢出"],
            Metric::Disk => &["磁盘", "硬盘", "存储空间"],
            Metric::Network => &["网络", "带宽", "丢包"],
            Metric::Latency => &["延迟", "超时", "响应慢", "耗时"],
            Metric::ErrorRate => &["错误率", "报错", "异常率"],
            Metric::Throughput => &["吞吐", "并发量"],
            Metric::Connections => &["连接数", "连接池", "连接"],
            Metric::Gc => &["垃圾回收"],
            Metric::ThreadPool => &["线程池", "线程"],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infrastructure components commonly named bare in incident reports
pub const KNOWN_INFRA: &[&str] = &[
    "redis",
    "mysql",
    "postgres",
    "postgresql",
    "kafka",
    "nginx",
    "elasticsearch",
    "mongodb",
    "rabbitmq",
    "zookeeper",
    "etcd",
    "memcached",
];

/// Suffixes that mark an identifier as a service in `name-suffix` form
pub const SERVICE_SUFFIXES: &[&str] = &[
    "service", "svc", "api", "gateway", "db", "cache", "worker", "server",
];
