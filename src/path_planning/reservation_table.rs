//! Space-time reservation table
//!
//! Holds the committed trajectory of every agent as timestamped samples.
//! Independent single-agent searches coordinate only through
//! [`ReservationTable::conflict`].

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::common::{AgentId, Path3D, Point3D, SpaceTimePoint};

/// Configuration for reservation conflict checks
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReservationConfig {
    /// Two samples closer than this are spatially conflicting
    pub conflict_radius: f64,
    /// Two samples closer than this in time are temporally conflicting
    pub time_window: f64,
    /// Body radius reported in dumps
    pub safety_radius: f64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            conflict_radius: 1.6,
            time_window: 0.04,
            safety_radius: 0.11,
        }
    }
}

/// Timestamped trajectory of one agent
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reservation {
    points: Vec<SpaceTimePoint>,
}

impl Reservation {
    pub fn new(points: Vec<SpaceTimePoint>) -> Self {
        Self { points }
    }

    /// Timestamp each waypoint at `epoch` plus accumulated travel time
    pub fn from_path(path: &Path3D, speed: f64, epoch: f64) -> Self {
        let mut points = Vec::with_capacity(path.len());
        let mut elapsed = 0.0;
        let mut previous: Option<Point3D> = None;

        for point in &path.points {
            if let Some(prev) = previous {
                elapsed += prev.distance(point) / speed;
            }
            points.push(SpaceTimePoint::new(*point, epoch + elapsed));
            previous = Some(*point);
        }

        Self { points }
    }

    pub fn points(&self) -> &[SpaceTimePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start_time(&self) -> Option<f64> {
        self.points.first().map(|p| p.time)
    }

    pub fn end_time(&self) -> Option<f64> {
        self.points.last().map(|p| p.time)
    }

    /// Time between the first and the last sample
    pub fn duration(&self) -> f64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }
}

/// Committed trajectories of every agent
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    config: ReservationConfig,
    reservations: HashMap<AgentId, Reservation>,
}

impl ReservationTable {
    pub fn new(config: ReservationConfig) -> Self {
        Self {
            config,
            reservations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// Insert or replace the reservation of `agent`
    pub fn add(&mut self, agent: AgentId, reservation: Reservation) {
        debug!(
            "[Reservations] agent {} reserved {} samples over {:.3}s",
            agent,
            reservation.len(),
            reservation.duration()
        );
        self.reservations.insert(agent, reservation);
    }

    pub fn remove(&mut self, agent: AgentId) -> Option<Reservation> {
        self.reservations.remove(&agent)
    }

    pub fn get(&self, agent: AgentId) -> Option<&Reservation> {
        self.reservations.get(&agent)
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn clear(&mut self) {
        self.reservations.clear();
    }

    /// Ids of every agent holding a reservation, ascending
    pub fn agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.reservations.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Whether another agent occupies `position` around `time`
    ///
    /// Both bounds are strict: a sample exactly `conflict_radius` away or
    /// exactly `time_window` apart does not conflict.
    pub fn conflict(&self, position: &Point3D, time: f64, excluding: AgentId) -> bool {
        self.reservations
            .iter()
            .filter(|(&agent, _)| agent != excluding)
            .flat_map(|(_, reservation)| reservation.points.iter())
            .any(|sample| {
                (sample.time - time).abs() < self.config.time_window
                    && sample.position.distance(position) < self.config.conflict_radius
            })
    }

    /// Index of the first sample in `points` that conflicts with another agent
    pub fn first_conflict(&self, points: &[SpaceTimePoint], excluding: AgentId) -> Option<usize> {
        points
            .iter()
            .position(|sample| self.conflict(&sample.position, sample.time, excluding))
    }

    /// Push every sample of `agent` at or after `from_time` back by `delay`
    ///
    /// Returns false when the agent holds no reservation.
    pub fn delay_agent(&mut self, agent: AgentId, from_time: f64, delay: f64) -> bool {
        match self.reservations.get_mut(&agent) {
            Some(reservation) => {
                let mut shifted = 0;
                for sample in reservation.points.iter_mut().filter(|s| s.time >= from_time) {
                    sample.time += delay;
                    shifted += 1;
                }
                debug!(
                    "[Reservations] agent {} delayed {} samples by {:.3}s",
                    agent, shifted, delay
                );
                true
            }
            None => false,
        }
    }

    /// Human-readable listing of every reservation, ordered by agent id
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReservationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reservations ({} agents)", self.reservations.len())?;
        for agent in self.agents() {
            let reservation = &self.reservations[&agent];
            writeln!(f, "agent {} ({} samples)", agent, reservation.len())?;
            for sample in &reservation.points {
                writeln!(
                    f,
                    "  [{:06.3}] {} r={:.2}",
                    sample.time, sample.position, self.config.safety_radius
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn straight_reservation(y: f64, epoch: f64) -> Reservation {
        let path = Path3D::from_points((0..5).map(|x| Point3D::new(x as f64, y, 0.0)).collect());
        Reservation::from_path(&path, 1.0, epoch)
    }

    #[test]
    fn test_from_path_timestamps() {
        let path = Path3D::from_points(vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(2.0, 0.0, 0.0),
            Point3D::new(2.0, 3.0, 0.0),
        ]);
        let reservation = Reservation::from_path(&path, 2.0, 10.0);
        let times: Vec<f64> = reservation.points().iter().map(|p| p.time).collect();
        assert_relative_eq!(times[0], 10.0);
        assert_relative_eq!(times[1], 11.0);
        assert_relative_eq!(times[2], 12.5);
        assert_relative_eq!(reservation.duration(), 2.5);
    }

    #[test]
    fn test_add_replaces_and_remove_deletes() {
        let mut table = ReservationTable::default();
        table.add(AgentId(1), straight_reservation(0.0, 0.0));
        table.add(AgentId(1), straight_reservation(5.0, 0.0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(AgentId(1)).unwrap().points()[0].position.y, 5.0);

        assert!(table.remove(AgentId(1)).is_some());
        assert!(table.remove(AgentId(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_conflict_is_strict_in_space_and_time() {
        let mut table = ReservationTable::default();
        table.add(AgentId(1), straight_reservation(0.0, 0.0));

        let other = AgentId(2);
        assert!(table.conflict(&Point3D::new(2.0, 1.0, 0.0), 2.0, other));
        assert!(table.conflict(&Point3D::new(2.0, 0.0, 0.0), 2.03, other));
        // just beyond the spatial radius
        assert!(!table.conflict(&Point3D::new(2.0, 1.7, 0.0), 2.0, other));
        // outside the time window
        assert!(!table.conflict(&Point3D::new(2.0, 0.0, 0.0), 2.05, other));
        // own samples never conflict
        assert!(!table.conflict(&Point3D::new(2.0, 0.0, 0.0), 2.0, AgentId(1)));
    }

    #[test]
    fn test_first_conflict() {
        let mut table = ReservationTable::default();
        table.add(AgentId(1), straight_reservation(0.0, 0.0));

        let candidate = vec![
            SpaceTimePoint::new(Point3D::new(2.0, 5.0, 0.0), 0.0),
            SpaceTimePoint::new(Point3D::new(2.0, 0.5, 0.0), 2.0),
            SpaceTimePoint::new(Point3D::new(3.0, 0.5, 0.0), 3.0),
        ];
        assert_eq!(table.first_conflict(&candidate, AgentId(2)), Some(1));
        assert_eq!(table.first_conflict(&candidate[..1], AgentId(2)), None);
    }

    #[test]
    fn test_delay_agent_shifts_future_samples() {
        let mut table = ReservationTable::default();
        table.add(AgentId(3), straight_reservation(0.0, 0.0));
        assert!(table.delay_agent(AgentId(3), 2.0, 0.5));
        assert!(!table.delay_agent(AgentId(4), 0.0, 0.5));

        let times: Vec<f64> = table.get(AgentId(3)).unwrap().points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_agents_sorted_and_dump_format() {
        let mut table = ReservationTable::default();
        table.add(AgentId(7), Reservation::new(vec![SpaceTimePoint::new(Point3D::new(1.0, 2.0, 3.0), 1.25)]));
        table.add(AgentId(2), Reservation::new(vec![SpaceTimePoint::new(Point3D::origin(), 0.0)]));
        assert_eq!(table.agents(), vec![AgentId(2), AgentId(7)]);

        let dump = table.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "Reservations (2 agents)");
        assert_eq!(lines[1], "agent 2 (1 samples)");
        assert_eq!(lines[2], "  [00.000] (0.00, 0.00, 0.00) r=0.11");
        assert_eq!(lines[3], "agent 7 (1 samples)");
        assert_eq!(lines[4], "  [01.250] (1.00, 2.00, 3.00) r=0.11");
    }
}
