use proptest::prelude::*;
use sharespace_solver::{BranchAndBound, LinearModel, LinearSolver, Relation, Sense, VarKind};

const TOLERANCE: f64 = 1e-6;

proptest! {
    #[test]
    fn bounded_knapsack_solutions_are_feasible(
        items in prop::collection::vec((0.1f64..10.0, 1.0f64..5.0, 0.5f64..4.0, any::<bool>()), 1..6),
        capacity in 1.0f64..20.0,
    ) {
        let mut model = LinearModel::new(Sense::Maximize);
        let mut vars = Vec::new();
        for (value, size, upper, integer) in &items {
            let kind = if *integer { VarKind::Integer } else { VarKind::Continuous };
            let var = model.add_var(kind, 0.0, *upper);
            model.add_objective_term(var, *value);
            vars.push((var, *size, *upper, *integer));
        }
        model.add_constraint(vars.iter().map(|(v, size, _, _)| (*v, *size)).collect(), Relation::Le, capacity);

        let result = BranchAndBound::default().solve(&model).unwrap();
        let used: f64 = vars.iter().map(|(v, size, _, _)| result.value(*v) * size).sum();
        prop_assert!(used <= capacity + TOLERANCE);
        for (var, _, upper, integer) in &vars {
            let x = result.value(*var);
            prop_assert!(x >= -TOLERANCE && x <= upper + TOLERANCE);
            if *integer {
                prop_assert!((x - x.round()).abs() < TOLERANCE);
            }
        }
        prop_assert!(result.objective >= -TOLERANCE);
    }

    #[test]
    fn disequality_is_respected(point in 0.0f64..10.0) {
        let mut model = LinearModel::new(Sense::Minimize);
        let x = model.add_nonnegative();
        model.add_objective_term(x, 1.0);
        model.add_constraint(vec![(x, 1.0)], Relation::Ge, point);
        model.add_constraint(vec![(x, 1.0)], Relation::Ne, point);

        let result = BranchAndBound::default().solve(&model).unwrap();
        prop_assert!((result.value(x) - point).abs() > 1e-4);
        prop_assert!(result.value(x) >= point - TOLERANCE);
    }
}
