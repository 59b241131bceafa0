use crate::{DEReport, DifferentialEvolution, SolverState};
use ndarray::Array1;

// ------------------------------ Internal helpers ------------------------------

impl DifferentialEvolution {
    /// Best member (slot 0) in physical units.
    pub(crate) fn best_x(&self) -> Array1<f64> {
        self.space.scale(self.population.member(0))
    }

    /// `std / |mean|` of the energies, `inf` while any member is unevaluated.
    pub(crate) fn convergence(&self) -> f64 {
        if !self.population.all_finite() {
            return f64::INFINITY;
        }
        let (mean, std) = self.population.energy_stats();
        std / (mean.abs() + f64::EPSILON)
    }

    /// Whether the energy spread is within `atol + tol * |mean|`. Never true
    /// while any member is unevaluated.
    pub(crate) fn converged(&self) -> bool {
        if !self.population.all_finite() {
            return false;
        }
        let (mean, std) = self.population.energy_stats();
        std <= self.config.atol + self.config.tol * mean.abs()
    }

    pub(crate) fn finish_aborted(&mut self, nit: usize) -> DEReport {
        self.token.reset();
        self.state = SolverState::Aborted;
        log::info!("DE aborted after {} generations, {} evaluations", nit, self.nfev);
        self.finish_report(nit, "aborted".to_string(), false)
    }

    pub(crate) fn finish_report(&self, nit: usize, message: String, success: bool) -> DEReport {
        let x = self.best_x();
        let fun = self.population.energies()[0];
        let maxcv = self
            .population
            .violations()
            .row(0)
            .fold(0.0_f64, |m, &v| m.max(v));
        self.build_report(nit, message, success, x, fun, maxcv)
    }

    pub(crate) fn finish_polished(
        &self,
        nit: usize,
        message: String,
        success: bool,
        x: Array1<f64>,
        fun: f64,
    ) -> DEReport {
        let maxcv = self
            .constraints
            .evaluate(x.view())
            .violation
            .fold(0.0_f64, |m, &v| m.max(v));
        self.build_report(nit, message, success, x, fun, maxcv)
    }

    fn build_report(
        &self,
        nit: usize,
        mut message: String,
        mut success: bool,
        x: Array1<f64>,
        fun: f64,
        maxcv: f64,
    ) -> DEReport {
        if maxcv > 0.0 {
            success = false;
            message = format!(
                "{message} The solution does not satisfy the constraints, MAXCV = {maxcv:.3e}"
            );
        }
        DEReport {
            x,
            fun,
            success,
            message,
            status: self.state,
            nit,
            nfev: self.nfev,
            population: self.space.scale_population(self.population.members()),
            population_energies: self.population.energies().clone(),
            maxcv,
        }
    }
}
