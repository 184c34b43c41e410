use crate::action::{ActionSelection, Exhaustive, SawtoothLp};
use crate::backup::{BackupOperator, MaxPlanBackup, TabularBackup};
use crate::bound::{Bound, Envelope, RepresentationKind, Sense};
use crate::config::{BoundConfig, SawtoothConfig, DEFAULT_PRECISION, DEFAULT_PRUNING_FREQUENCY};
use crate::initializer::Initializer;
use crate::traits::{Horizon, OccupancyWorld, PwlcWorld, World};

/// Assembles a [`Bound`]. Unless told otherwise the bound is tabular, uses
/// the world's horizon, the tabular backup and exhaustive action selection.
pub struct BoundBuilder<W: World> {
    sense: Sense,
    kind: RepresentationKind,
    horizon: Option<Horizon>,
    initializer: Option<Initializer<W::State>>,
    backup: Option<Box<dyn BackupOperator<W>>>,
    selection: Option<Box<dyn ActionSelection<W>>>,
    precision: f64,
    pruning_frequency: Option<usize>,
}

impl<W: World> BoundBuilder<W> {
    pub fn new(sense: Sense) -> Self {
        Self {
            sense,
            kind: RepresentationKind::Tabular,
            horizon: None,
            initializer: None,
            backup: None,
            selection: None,
            precision: DEFAULT_PRECISION,
            pruning_frequency: None,
        }
    }

    pub fn lower() -> Self {
        Self::new(Sense::Lower)
    }

    pub fn upper() -> Self {
        Self::new(Sense::Upper)
    }

    pub fn tabular(mut self) -> Self {
        self.kind = RepresentationKind::Tabular;
        self
    }

    pub fn point_set(mut self) -> Self {
        self.kind = RepresentationKind::PointSet;
        self
    }

    pub fn hyperplanes(mut self) -> Self {
        self.kind = RepresentationKind::Hyperplanes;
        self
    }

    pub fn with_horizon(mut self, horizon: Horizon) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn with_initializer(mut self, initializer: Initializer<W::State>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn with_backup(mut self, backup: impl BackupOperator<W> + 'static) -> Self {
        self.backup = Some(Box::new(backup));
        self
    }

    pub fn with_selection(mut self, selection: impl ActionSelection<W> + 'static) -> Self {
        self.selection = Some(Box::new(selection));
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Prune the updated stage every `every` updates; `0` never prunes.
    pub fn with_pruning_frequency(mut self, every: usize) -> Self {
        self.pruning_frequency = Some(every);
        self
    }

    /// Apply a [`BoundConfig`]. A config without a pruning frequency keeps
    /// the one already chosen.
    pub fn with_config(mut self, config: &BoundConfig) -> Self {
        self.precision = config.precision;
        self.pruning_frequency = config.pruning_frequency.or(self.pruning_frequency);
        self
    }

    fn with_default_pruning(mut self) -> Self {
        self.pruning_frequency.get_or_insert(DEFAULT_PRUNING_FREQUENCY);
        self
    }

    pub fn build(self, world: &W) -> Bound<W> {
        let horizon = self.horizon.unwrap_or_else(|| world.horizon());
        let envelope = Envelope::new(self.sense, horizon, self.kind, self.precision);
        let backup = self
            .backup
            .unwrap_or_else(|| Box::new(TabularBackup) as Box<dyn BackupOperator<W>>);
        let selection = self
            .selection
            .unwrap_or_else(|| Box::new(Exhaustive) as Box<dyn ActionSelection<W>>);
        Bound::new(
            envelope,
            self.initializer,
            backup,
            selection,
            self.pruning_frequency,
        )
    }
}

impl<W: PwlcWorld> BoundBuilder<W> {
    /// Hyperplane representation tightened by max-plan backups. Pruning
    /// defaults to every [`DEFAULT_PRUNING_FREQUENCY`] updates.
    pub fn max_plan(self) -> Self {
        self.hyperplanes()
            .with_backup(MaxPlanBackup)
            .with_default_pruning()
    }
}

impl<W: OccupancyWorld + 'static> BoundBuilder<W> {
    /// Point-set representation whose greedy decision rules come from the
    /// sawtooth program. Pruning defaults as for [`BoundBuilder::max_plan`].
    pub fn sawtooth(self, config: SawtoothConfig) -> Self {
        self.point_set()
            .with_backup(TabularBackup)
            .with_selection(SawtoothLp::<W>::new(config))
            .with_default_pruning()
    }
}

#[cfg(test)]
mod tests {
    use super::BoundBuilder;
    use crate::bound::{RepresentationKind, Sense};
    use crate::config::{BoundConfig, SawtoothConfig, DEFAULT_PRUNING_FREQUENCY};
    use crate::models::decpomdp::{DecPomdp, OccupancyMdp};
    use crate::models::mdp::TabularMdp;
    use crate::models::pomdp::TabularPomdp;
    use crate::traits::Horizon;

    #[test]
    fn defaults_follow_the_world() {
        let mdp = TabularMdp::chain(3, Horizon::Finite(4), 0.9).unwrap();
        let bound = BoundBuilder::lower().build(&mdp);
        assert_eq!(bound.sense(), Sense::Lower);
        assert_eq!(bound.kind(), RepresentationKind::Tabular);
        assert_eq!(bound.horizon(), Horizon::Finite(4));
        assert_eq!(bound.backup_name(), "tabular");
    }

    #[test]
    fn horizon_override() {
        let mdp = TabularMdp::chain(3, Horizon::Finite(4), 0.9).unwrap();
        let bound = BoundBuilder::upper()
            .point_set()
            .with_horizon(Horizon::Infinite)
            .build(&mdp);
        assert_eq!(bound.kind(), RepresentationKind::PointSet);
        assert!(bound.is_infinite_horizon());
    }

    #[test]
    fn max_plan_and_sawtooth_prune_by_default() {
        let tiger = TabularPomdp::tiger(Horizon::Finite(3), 1.0).unwrap();
        let lower = BoundBuilder::lower().max_plan().build(&tiger);
        assert_eq!(lower.pruning_frequency(), Some(DEFAULT_PRUNING_FREQUENCY));

        let world = OccupancyMdp::new(DecPomdp::dec_tiger(2).unwrap()).unwrap();
        let upper = BoundBuilder::upper()
            .sawtooth(SawtoothConfig::default())
            .build(&world);
        assert_eq!(upper.kind(), RepresentationKind::PointSet);
        assert_eq!(upper.pruning_frequency(), Some(DEFAULT_PRUNING_FREQUENCY));
    }

    #[test]
    fn explicit_pruning_wins_over_the_default() {
        let tiger = TabularPomdp::tiger(Horizon::Finite(3), 1.0).unwrap();
        let never = BoundBuilder::lower()
            .with_pruning_frequency(0)
            .max_plan()
            .build(&tiger);
        assert_eq!(never.pruning_frequency(), None);

        let configured = BoundBuilder::lower()
            .max_plan()
            .with_config(&BoundConfig {
                pruning_frequency: Some(3),
                ..BoundConfig::default()
            })
            .build(&tiger);
        assert_eq!(configured.pruning_frequency(), Some(3));

        let unset = BoundBuilder::lower()
            .max_plan()
            .with_config(&BoundConfig::default())
            .build(&tiger);
        assert_eq!(unset.pruning_frequency(), Some(DEFAULT_PRUNING_FREQUENCY));
    }
}
