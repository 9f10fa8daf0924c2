// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod helpers;

pub mod discovery_test;
pub mod pipeline_test;
pub mod resume_test;
