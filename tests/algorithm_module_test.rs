/// 算法模块综合测试
///
/// 覆盖路径损耗模型、局部投影与多边定位求解器的组合使用

#[cfg(test)]
mod tests {
    use cellnav::algorithms::*;
    use cellnav::error::SolveError;
    use rstest::rstest;

    const TOLERANCE_M: f64 = 1e-6;

    #[rstest]
    #[case(Generation::Gsm)]
    #[case(Generation::Wcdma)]
    #[case(Generation::Lte)]
    fn test_distance_monotonic_and_clamped(#[case] generation: Generation) {
        let reference_loss = PathLossTable::default()
            .params(generation)
            .unwrap()
            .reference_loss_db as i32;

        // 低于参考损耗的有效区间内严格递减
        let mut previous = f64::INFINITY;
        for signal in -120..reference_loss {
            let distance = estimate_distance(signal, generation).unwrap();
            assert!(distance > 1.0, "{} @ {} dBm → {}", generation, signal, distance);
            assert!(distance < previous, "{} 距离应随信号增强严格递减", generation);
            previous = distance;
        }

        // 达到或超过参考损耗时钳位到参考距离
        for signal in reference_loss..=60 {
            assert_eq!(estimate_distance(signal, generation).unwrap(), 1.0);
        }
    }

    #[rstest]
    #[case(Generation::Gsm, -80, 1165.9144)]
    #[case(Generation::Lte, -70, 542.2221)]
    fn test_reference_distances(#[case] generation: Generation, #[case] signal: i32, #[case] expected: f64) {
        let distance = estimate_distance(signal, generation).unwrap();
        assert!(
            (distance - expected).abs() / expected < 1e-3,
            "{} @ {} dBm: 期望 {:.4} m，实际 {:.4} m",
            generation,
            signal,
            expected,
            distance
        );
    }

    #[test]
    fn test_distance_to_rssi_inverse() {
        let table = PathLossTable::default();
        for generation in Generation::ALL {
            let distance = table.estimate_distance(-95, generation).unwrap();
            let rssi = table.distance_to_rssi(distance, generation).unwrap();
            assert!((rssi + 95.0).abs() < 1e-9);
        }
    }

    fn planted_case(target: PlanarPoint, anchors: &[PlanarPoint]) -> Vec<f64> {
        anchors.iter().map(|a| a.distance_to(&target)).collect()
    }

    #[rstest]
    #[case(PlanarPoint::new(300.0, -200.0))]
    #[case(PlanarPoint::new(1500.0, 2500.0))]
    #[case(PlanarPoint::new(-40.0, 75.0))]
    fn test_planted_target_recovered(#[case] target: PlanarPoint) {
        let anchors = [
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(1000.0, 0.0),
            PlanarPoint::new(0.0, 1000.0),
            PlanarPoint::new(800.0, 900.0),
        ];
        let distances = planted_case(target, &anchors);
        let fix = Multilaterator::default().solve_planar(&anchors, &distances).unwrap();

        println!("🎯 目标 {:?} → {}", target, fix);
        assert!(fix.converged);
        assert!(fix.position.distance_to(&target) < TOLERANCE_M);
        assert!(fix.residual_rms_m < TOLERANCE_M);
    }

    #[test]
    fn test_order_invariance() {
        let target = PlanarPoint::new(420.0, 130.0);
        let mut anchors = vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(900.0, 50.0),
            PlanarPoint::new(200.0, 800.0),
        ];
        let forward = {
            let distances = planted_case(target, &anchors);
            Multilaterator::default().solve_planar(&anchors, &distances).unwrap()
        };
        anchors.reverse();
        let backward = {
            let distances = planted_case(target, &anchors);
            Multilaterator::default().solve_planar(&anchors, &distances).unwrap()
        };
        assert!(forward.position.distance_to(&backward.position) < TOLERANCE_M);
    }

    #[test]
    fn test_collinear_observers_singular() {
        let points = [
            GeoPoint::new(45.0, 5.0),
            GeoPoint::new(45.0, 5.01),
            GeoPoint::new(45.0, 5.03),
        ];
        let result = Multilaterator::default().solve(&points, &[500.0, 500.0, 500.0]);
        assert_eq!(result, Err(SolveError::SingularSystem { iteration: 0 }));
    }

    #[test]
    fn test_too_few_observations() {
        let points = [GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)];
        assert!(matches!(
            Multilaterator::default().solve(&points, &[100.0, 100.0]),
            Err(SolveError::InsufficientInput { points: 2, distances: 2 })
        ));
    }

    /// 三个观测点、同一信号强度下的端到端定位
    ///
    /// 等距离的最小二乘解落在平面坐标 (451.05, 451.05) m 附近
    #[test]
    fn test_end_to_end_geographic() {
        let distance = estimate_distance(-70, Generation::Lte).unwrap();
        let points = [
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.01, 0.0),
        ];
        let fix = Multilaterator::default()
            .solve(&points, &[distance; 3])
            .unwrap();

        println!("📍 {}", fix.detailed_description());
        assert!(fix.converged());
        assert_eq!(fix.observation_count, 3);
        assert_eq!(fix.reference, points[0]);

        let expected = PlanarPoint::new(451.05, 451.05);
        assert!(fix.planar.position.distance_to(&expected) < 5.0);
        assert!((fix.position.latitude - 0.004_056_4).abs() < 1e-6);
        assert!((fix.position.longitude - 0.004_056_4).abs() < 1e-6);

        // 输入顺序不影响地理坐标结果
        let mut reversed = points;
        reversed.reverse();
        let reversed_fix = Multilaterator::default()
            .solve(&reversed, &[distance; 3])
            .unwrap();
        assert!(!reversed_fix.position.differs_from(&fix.position, 1e-7));
    }
}
