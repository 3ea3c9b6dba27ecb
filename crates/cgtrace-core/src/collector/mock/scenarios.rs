//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic cgroup mount layouts. Each one sets the
//! mount table and populates the hierarchy below it.

use super::filesystem::MockFs;

/// Root of the cpu hierarchy in [`MockFs::cgroup_v1_cpu`].
pub const V1_CPU_ROOT: &str = "/sys/fs/cgroup/cpu";

/// Root of the unified hierarchy in [`MockFs::cgroup_v2`].
pub const V2_ROOT: &str = "/sys/fs/cgroup";

#[allow(dead_code)]
impl MockFs {
    /// A single cgroup v1 cpu hierarchy with one child group `svc1`.
    pub fn cgroup_v1_cpu() -> Self {
        let fs = Self::new();
        fs.set_mounts(format!("cgroup {} cgroup rw,cpu 0 0\n", V1_CPU_ROOT));

        fs.add_file(format!("{}/cgroup.procs", V1_CPU_ROOT), "");
        fs.add_file(format!("{}/svc1/cgroup.procs", V1_CPU_ROOT), "");
        fs.add_file(format!("{}/svc1/cpu.shares", V1_CPU_ROOT), "1024\n");
        fs
    }

    /// A typical systemd-era v1 layout: co-mounted `cpu,cpuacct`, memory and
    /// devices hierarchies, each with a `system.slice` child.
    pub fn cgroup_v1_system() -> Self {
        let fs = Self::new();
        fs.set_mounts(
            "\
24 18 0:22 / /sys/fs/cgroup ro,nosuid,nodev,noexec shared:9 - tmpfs tmpfs ro,mode=755
30 24 0:28 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid,nodev,noexec,relatime shared:14 - cgroup cgroup rw,cpu,cpuacct
31 24 0:29 / /sys/fs/cgroup/memory rw,nosuid,nodev,noexec,relatime shared:15 - cgroup cgroup rw,memory
32 24 0:30 / /sys/fs/cgroup/devices rw,nosuid,nodev,noexec,relatime shared:16 - cgroup cgroup rw,devices
",
        );

        let cpu = "/sys/fs/cgroup/cpu,cpuacct";
        fs.add_file(format!("{}/cgroup.procs", cpu), "1\n");
        fs.add_file(format!("{}/cpu.shares", cpu), "1024\n");
        fs.add_file(format!("{}/cpu.cfs_quota_us", cpu), "-1\n");
        fs.add_file(format!("{}/notify_on_release", cpu), "0\n");
        fs.add_file(format!("{}/release_agent", cpu), "");
        fs.add_file(format!("{}/system.slice/cgroup.procs", cpu), "412\n588\n");
        fs.add_file(format!("{}/system.slice/cpu.shares", cpu), "1024\n");
        fs.add_file(format!("{}/system.slice/cpu.cfs_quota_us", cpu), "-1\n");
        fs.add_file(format!("{}/system.slice/cpuacct.usage", cpu), "987654321\n");

        let memory = "/sys/fs/cgroup/memory";
        fs.add_file(format!("{}/cgroup.procs", memory), "1\n");
        fs.add_file(
            format!("{}/memory.limit_in_bytes", memory),
            "9223372036854771712\n",
        );
        fs.add_file(format!("{}/system.slice/cgroup.procs", memory), "412\n588\n");
        fs.add_file(
            format!("{}/system.slice/memory.limit_in_bytes", memory),
            "536870912\n",
        );
        fs.add_file(
            format!("{}/system.slice/memory.oom_control", memory),
            "oom_kill_disable 0\nunder_oom 0\noom_kill 0\n",
        );

        let devices = "/sys/fs/cgroup/devices";
        fs.add_file(format!("{}/cgroup.procs", devices), "1\n");
        fs.add_file(format!("{}/devices.list", devices), "a *:* rwm\n");
        fs.add_file(format!("{}/system.slice/cgroup.procs", devices), "412\n588\n");
        fs.add_file(
            format!("{}/system.slice/devices.list", devices),
            "c 1:3 rwm\nc 1:5 rwm\nb 8:0 r\n",
        );
        fs
    }

    /// A cgroup v2 unified hierarchy.
    pub fn cgroup_v2() -> Self {
        let fs = Self::new();
        fs.set_mounts(format!(
            "cgroup2 {} cgroup2 rw,nosuid,nodev,noexec,relatime,nsdelegate 0 0\n",
            V2_ROOT
        ));

        fs.add_file(format!("{}/cgroup.procs", V2_ROOT), "1\n");
        fs.add_file(format!("{}/cgroup.subtree_control", V2_ROOT), "cpu io memory pids\n");
        fs.add_file(format!("{}/cgroup.controllers", V2_ROOT), "cpuset cpu io memory pids\n");

        let slice = format!("{}/system.slice", V2_ROOT);
        fs.add_file(format!("{}/cgroup.procs", slice), "");
        fs.add_file(format!("{}/cgroup.type", slice), "domain\n");
        fs.add_file(format!("{}/cpu.max", slice), "max 100000\n");
        fs.add_file(format!("{}/cpu.weight", slice), "100\n");
        fs.add_file(format!("{}/memory.max", slice), "max\n");

        let unit = format!("{}/nginx.service", slice);
        fs.add_file(format!("{}/cgroup.procs", unit), "1201\n1202\n");
        fs.add_file(format!("{}/cpu.max", unit), "50000 100000\n");
        fs.add_file(format!("{}/memory.max", unit), "268435456\n");
        fs.add_file(format!("{}/pids.max", unit), "max\n");
        fs
    }
}
