//! Parsing of the agent's container tables.
//!
//! The agent answers `list-containers` and `list-container-stats` with plain
//! text: one header line, then one line per container, columns separated by
//! `|||`.

use std::collections::HashMap;

use crate::domain::types::ContainerStats;

pub const COLUMN_SEPARATOR: &str = "|||";

/// Split a separated table into one map per row, keyed by header name.
/// Blank lines are skipped; an empty body yields no rows.
pub fn parse_rows(text: &str) -> Vec<HashMap<String, String>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<&str> = match lines.next() {
        Some(header) => header.split(COLUMN_SEPARATOR).map(str::trim).collect(),
        None => return Vec::new(),
    };

    lines
        .map(|line| {
            headers
                .iter()
                .zip(line.split(COLUMN_SEPARATOR))
                .map(|(h, v)| (h.to_string(), v.trim().to_string()))
                .collect()
        })
        .collect()
}

/// Build container rows from the `list-containers` table.
pub fn parse_containers(text: &str) -> Vec<ContainerStats> {
    parse_rows(text)
        .into_iter()
        .map(|mut row| {
            let mut take = |key: &str| row.remove(key).unwrap_or_default();
            ContainerStats {
                container_id: take("CONTAINER ID"),
                image: take("IMAGE"),
                command: take("COMMAND"),
                created_at: take("CREATED AT"),
                status: take("STATUS"),
                ports: shorten_ports(&take("PORTS")),
                names: take("NAMES"),
                ..ContainerStats::default()
            }
        })
        .collect()
}

/// Resource usage columns of one `list-container-stats` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageRow {
    pub container_id: String,
    pub cpu_percent: Option<String>,
    pub mem_usage_limit: Option<String>,
    pub mem_percent: Option<String>,
    pub net_io: Option<String>,
    pub block_io: Option<String>,
    pub pids: Option<String>,
}

pub fn parse_usage(text: &str) -> Vec<UsageRow> {
    parse_rows(text)
        .into_iter()
        .filter_map(|mut row| {
            let container_id = row.remove("CONTAINER ID")?;
            Some(UsageRow {
                container_id,
                cpu_percent: row.remove("CPU %"),
                mem_usage_limit: row.remove("MEM USAGE / LIMIT"),
                mem_percent: row.remove("MEM %"),
                net_io: row.remove("NET I/O"),
                block_io: row.remove("BLOCK I/O"),
                pids: row.remove("PIDS"),
            })
        })
        .collect()
}

/// Attach usage columns to the listed containers. The container list is
/// authoritative: usage rows for unknown ids are ignored.
pub fn merge_usage(containers: &mut [ContainerStats], usage: Vec<UsageRow>) {
    for row in usage {
        if let Some(c) = containers
            .iter_mut()
            .find(|c| c.container_id == row.container_id)
        {
            c.cpu_percent = row.cpu_percent;
            c.mem_usage_limit = row.mem_usage_limit;
            c.mem_percent = row.mem_percent;
            c.net_io = row.net_io;
            c.block_io = row.block_io;
            c.pid_count = row.pids;
        }
    }
}

/// Reduce docker's port listing to `<host port>/<protocol>`.
///
/// `0.0.0.0:8080->80/tcp, :::8080->80/tcp` becomes `8080/tcp`. Anything not
/// in that shape is returned unchanged.
pub fn shorten_ports(ports: &str) -> String {
    let Some((_, ipv6)) = ports.split_once(":::") else {
        return ports.to_string();
    };
    let Some((host_port, _)) = ipv6.split_once("->") else {
        return ipv6.to_string();
    };
    let Some((_, protocol)) = ipv6.split_once('/') else {
        return ipv6.to_string();
    };
    format!("{}/{}", host_port, protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINERS: &str = "CONTAINER ID|||IMAGE|||COMMAND|||CREATED AT|||STATUS|||PORTS|||NAMES\n\
        a1b2|||nginx:1.25|||\"nginx -g\"|||2024-05-01 10:00:00|||Up 2 hours|||0.0.0.0:8080->80/tcp, :::8080->80/tcp|||web\n\
        \n\
        c3d4|||redis:7|||\"redis-server\"|||2024-05-01 09:00:00|||Up 3 hours||||||cache\n";

    const STATS: &str = "CONTAINER ID|||CONTAINER|||CPU %|||MEM USAGE / LIMIT|||MEM %|||NET I/O|||BLOCK I/O|||PIDS\n\
        c3d4|||cache|||0.31%|||3.1MiB / 15.5GiB|||0.02%|||1.2kB / 0B|||0B / 0B|||5\n\
        ffff|||ghost|||1%|||1MiB / 1GiB|||0.1%|||0B / 0B|||0B / 0B|||1\n";

    #[test]
    fn parses_container_list() {
        let rows = parse_containers(CONTAINERS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].container_id, "a1b2");
        assert_eq!(rows[0].image, "nginx:1.25");
        assert_eq!(rows[0].ports, "8080/tcp");
        assert_eq!(rows[1].names, "cache");
        assert_eq!(rows[1].ports, "");
        assert!(rows[0].cpu_percent.is_none());
    }

    #[test]
    fn empty_body_means_no_containers() {
        assert!(parse_containers("").is_empty());
        assert!(parse_containers("\n  \n").is_empty());
        assert!(parse_containers("CONTAINER ID|||IMAGE\n").is_empty());
    }

    #[test]
    fn merges_usage_by_container_id() {
        let mut rows = parse_containers(CONTAINERS);
        merge_usage(&mut rows, parse_usage(STATS));

        assert!(rows[0].cpu_percent.is_none());
        assert_eq!(rows[1].cpu_percent.as_deref(), Some("0.31%"));
        assert_eq!(rows[1].mem_usage_limit.as_deref(), Some("3.1MiB / 15.5GiB"));
        assert_eq!(rows[1].pid_count.as_deref(), Some("5"));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn shortens_docker_port_listing() {
        assert_eq!(shorten_ports("0.0.0.0:5432->5432/tcp, :::5432->5432/tcp"), "5432/tcp");
        assert_eq!(shorten_ports("80/tcp"), "80/tcp");
        assert_eq!(shorten_ports(""), "");
    }
}
